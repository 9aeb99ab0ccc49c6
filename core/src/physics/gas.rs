//! Gas consumption and exposure metrics.

use crate::config::{NoStopLimit, PhysicsConfig};
use crate::models::ProfileSample;
use crate::physics::p_abs;

/// Time spent at or below `threshold_m`, in seconds.
///
/// Each interval is attributed to the sample that opens it, so the last
/// sample contributes nothing.
pub fn bottom_time_sec(samples: &[ProfileSample], threshold_m: f64) -> f64 {
    samples
        .windows(2)
        .filter(|w| w[0].depth_m >= threshold_m)
        .map(|w| w[1].elapsed_seconds - w[0].elapsed_seconds)
        .sum()
}

/// Time-weighted mean absolute pressure (bar), trapezoidal over the whole
/// profile. `None` when the profile spans no time.
pub fn mean_absolute_pressure(samples: &[ProfileSample]) -> Option<f64> {
    let (first, last) = (samples.first()?, samples.last()?);
    let duration = last.elapsed_seconds - first.elapsed_seconds;
    if duration <= 0.0 {
        return None;
    }
    let integral: f64 = samples
        .windows(2)
        .map(|w| {
            let dt = w[1].elapsed_seconds - w[0].elapsed_seconds;
            (p_abs(w[0].depth_m) + p_abs(w[1].depth_m)) / 2.0 * dt
        })
        .sum();
    Some(integral / duration)
}

/// Surface air consumption in L/min.
///
/// `None` unless gas was actually consumed over a positive bottom time.
pub fn sac_l_per_min(
    pressure_drop_bar: f64,
    tank_volume_l: f64,
    bottom_time_min: f64,
    mean_pressure_bar: f64,
) -> Option<f64> {
    if pressure_drop_bar <= 0.0 || bottom_time_min <= 0.0 || mean_pressure_bar <= 0.0 {
        return None;
    }
    Some(pressure_drop_bar * tank_volume_l / (bottom_time_min * mean_pressure_bar))
}

/// Drop between the first and last tank pressure readings. Needs two.
pub fn pressure_drop_bar(samples: &[ProfileSample]) -> Option<f64> {
    let mut readings = samples.iter().filter_map(|s| s.tank_pressure_bar);
    let first = readings.next()?;
    let last = readings.last()?;
    Some(first - last)
}

/// SAC for a profile, combining the helpers above.
pub fn profile_sac(
    samples: &[ProfileSample],
    bottom_time_min: f64,
    mean_pressure_bar: Option<f64>,
    config: &PhysicsConfig,
) -> Option<f64> {
    let drop = pressure_drop_bar(samples)?;
    let sac = sac_l_per_min(drop, config.tank_volume_l, bottom_time_min, mean_pressure_bar?);
    if sac.is_none() {
        tracing::debug!(
            "SAC not computable: drop {:.1} bar over {:.1} min",
            drop,
            bottom_time_min
        );
    }
    sac
}

/// Highest partial pressure (bar) reached by a gas making up `fraction` of
/// the breathing mix.
pub fn max_partial_pressure(samples: &[ProfileSample], fraction: f64) -> f64 {
    samples
        .iter()
        .map(|s| fraction * p_abs(s.depth_m))
        .fold(0.0, f64::max)
}

/// No-stop limit (minutes) for a dive to `max_depth_m`: the row with the
/// smallest depth not shallower than the dive. `None` when the dive is
/// deeper than every row.
pub fn no_stop_limit_min(table: &[NoStopLimit], max_depth_m: f64) -> Option<f64> {
    table
        .iter()
        .filter(|row| row.depth_m >= max_depth_m)
        .min_by(|a, b| a.depth_m.total_cmp(&b.depth_m))
        .map(|row| row.max_bottom_time_min)
}
