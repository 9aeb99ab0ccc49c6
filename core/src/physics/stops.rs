//! Safety stop detection.
//!
//! A candidate window is a maximal run of consecutive samples inside the
//! configured depth band. Windows lasting at least the minimum duration
//! qualify, and qualifying windows separated by no more than the merge gap
//! are reported as a single stop.

use std::ops::RangeInclusive;

use crate::config::PhysicsConfig;
use crate::models::ProfileSample;

/// A detected safety stop.
#[derive(Clone, Debug, PartialEq, uniffi::Record)]
pub struct SafetyStop {
    pub start_s: f64,
    pub end_s: f64,
    /// Mean sample depth over the stop.
    pub depth_m: f64,
}

impl SafetyStop {
    pub fn duration_s(&self) -> f64 {
        self.end_s - self.start_s
    }
}

/// Index ranges of maximal in-band runs.
fn in_band_runs(samples: &[ProfileSample], config: &PhysicsConfig) -> Vec<RangeInclusive<usize>> {
    let band = config.safety_depth_range_m;
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;

    for (i, sample) in samples.iter().enumerate() {
        match (band.contains(sample.depth_m), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(s..=i - 1);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(s..=samples.len() - 1);
    }
    runs
}

pub fn detect_safety_stops(samples: &[ProfileSample], config: &PhysicsConfig) -> Vec<SafetyStop> {
    let time = |i: usize| samples[i].elapsed_seconds;

    let qualifying = in_band_runs(samples, config)
        .into_iter()
        .filter(|run| time(*run.end()) - time(*run.start()) >= config.safety_min_duration_s);

    let mut merged: Vec<RangeInclusive<usize>> = Vec::new();
    for run in qualifying {
        if let Some(last) = merged.last_mut() {
            if time(*run.start()) - time(*last.end()) <= config.safety_merge_gap_s {
                *last = *last.start()..=*run.end();
                continue;
            }
        }
        merged.push(run);
    }

    let stops: Vec<SafetyStop> = merged
        .into_iter()
        .map(|range| {
            let window = &samples[range.clone()];
            let depth_m = window.iter().map(|s| s.depth_m).sum::<f64>() / window.len() as f64;
            SafetyStop {
                start_s: time(*range.start()),
                end_s: time(*range.end()),
                depth_m,
            }
        })
        .collect();

    for stop in &stops {
        tracing::debug!(
            "Safety stop at {:.1} m for {:.0} s from {:.0} s",
            stop.depth_m,
            stop.duration_s(),
            stop.start_s
        );
    }
    stops
}
