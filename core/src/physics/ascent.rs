//! Ascent-speed trace and classification.

use crate::config::PhysicsConfig;
use crate::models::ProfileSample;

/// Severity of a vertical speed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, uniffi::Enum)]
pub enum AscentClass {
    Safe,
    Warning,
    Dangerous,
}

impl AscentClass {
    /// Classify a speed in m/min, positive when ascending.
    ///
    /// Both thresholds are inclusive upper bounds of their class.
    pub fn from_speed(speed_m_per_min: f64, config: &PhysicsConfig) -> Self {
        if speed_m_per_min <= config.safe_ascent_m_per_min {
            AscentClass::Safe
        } else if speed_m_per_min <= config.warning_ascent_m_per_min {
            AscentClass::Warning
        } else {
            AscentClass::Dangerous
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AscentClass::Safe => "Safe",
            AscentClass::Warning => "Warning",
            AscentClass::Dangerous => "Dangerous",
        }
    }
}

/// Vertical speed over the interval ending at a sample.
#[derive(Clone, Debug, PartialEq, uniffi::Record)]
pub struct AscentPoint {
    pub elapsed_seconds: f64,
    /// Positive when ascending, negative when descending.
    pub speed_m_per_min: f64,
    pub class: AscentClass,
}

/// Speed and class for every sample. The first point has no interval and
/// is reported as 0 m/min.
///
/// Speeds are clipped to `max_plausible_ascent_m_per_min` in both
/// directions, so a single depth spike cannot dominate the maximum.
pub fn ascent_trace(samples: &[ProfileSample], config: &PhysicsConfig) -> Vec<AscentPoint> {
    let clip = config.max_plausible_ascent_m_per_min;
    let mut clipped = 0usize;

    let trace: Vec<AscentPoint> = samples
        .iter()
        .enumerate()
        .map(|(i, sample)| {
            let speed = match i.checked_sub(1).map(|p| &samples[p]) {
                Some(prev) => {
                    let dt_min = (sample.elapsed_seconds - prev.elapsed_seconds) / 60.0;
                    let raw = if dt_min > 0.0 {
                        (prev.depth_m - sample.depth_m) / dt_min
                    } else {
                        0.0
                    };
                    if raw.abs() > clip {
                        clipped += 1;
                    }
                    raw.clamp(-clip, clip)
                }
                None => 0.0,
            };
            AscentPoint {
                elapsed_seconds: sample.elapsed_seconds,
                speed_m_per_min: speed,
                class: AscentClass::from_speed(speed, config),
            }
        })
        .collect();

    if clipped > 0 {
        tracing::debug!("Clipped {} implausible vertical speeds to {} m/min", clipped, clip);
    }
    trace
}

/// Fastest ascent in the trace, 0 when the diver never ascends.
pub fn max_ascent_speed(trace: &[AscentPoint]) -> f64 {
    trace
        .iter()
        .map(|p| p.speed_m_per_min)
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_boundaries() {
        let config = PhysicsConfig::default();
        assert_eq!(AscentClass::from_speed(10.0, &config), AscentClass::Safe);
        assert_eq!(AscentClass::from_speed(11.0, &config), AscentClass::Warning);
        assert_eq!(AscentClass::from_speed(15.0, &config), AscentClass::Warning);
        assert_eq!(AscentClass::from_speed(15.1, &config), AscentClass::Dangerous);
        assert_eq!(AscentClass::from_speed(-20.0, &config), AscentClass::Safe);
    }

    #[test]
    fn test_trace_aligned_with_profile() {
        let config = PhysicsConfig::default();
        let samples = vec![
            ProfileSample::new(0.0, 0.0),
            ProfileSample::new(60.0, 18.0),
            ProfileSample::new(120.0, 7.0),
            ProfileSample::new(180.0, 0.0),
        ];

        let trace = ascent_trace(&samples, &config);
        assert_eq!(trace.len(), samples.len());
        assert_eq!(trace[0].speed_m_per_min, 0.0);
        assert_eq!(trace[0].class, AscentClass::Safe);
        assert_eq!(trace[1].speed_m_per_min, -18.0);
        assert_eq!(trace[2].speed_m_per_min, 11.0);
        assert_eq!(trace[2].class, AscentClass::Warning);
        assert_eq!(trace[3].class, AscentClass::Safe);
        assert_eq!(max_ascent_speed(&trace), 11.0);
    }

    #[test]
    fn test_spikes_are_clipped() {
        let config = PhysicsConfig::default();
        let samples = vec![
            ProfileSample::new(0.0, 20.0),
            ProfileSample::new(1.0, 5.0),
        ];

        let trace = ascent_trace(&samples, &config);
        assert_eq!(trace[1].speed_m_per_min, 30.0);
        assert_eq!(trace[1].class, AscentClass::Dangerous);
    }

    #[test]
    fn test_descent_only_has_zero_max() {
        let config = PhysicsConfig::default();
        let samples = vec![
            ProfileSample::new(0.0, 0.0),
            ProfileSample::new(60.0, 10.0),
        ];
        assert_eq!(max_ascent_speed(&ascent_trace(&samples, &config)), 0.0);
    }
}
