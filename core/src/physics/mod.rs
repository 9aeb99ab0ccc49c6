//! Decompression-physics analysis of a normalized profile.
//!
//! Everything here is a pure function of a [`DiveProfile`] and a
//! [`PhysicsConfig`]. The model is a simplified single-compartment
//! approximation meant for after-the-fact analysis, not dive planning.

pub mod ascent;
pub mod gas;
pub mod stops;
pub mod tissue;

use crate::config::PhysicsConfig;
use crate::error::PhysicsError;
use crate::models::{DiveProfile, ProfileSample};
use crate::normalize::MIN_PROFILE_SAMPLES;

pub use ascent::{AscentClass, AscentPoint};
pub use stops::SafetyStop;
pub use tissue::{ResidualNitrogen, SaturationPoint, TracePeak};

/// Surface pressure (bar) assumed by the model.
pub const SURFACE_PRESSURE_BAR: f64 = 1.0;

/// Depth of water adding one bar of pressure (m).
pub const METERS_PER_BAR: f64 = 10.0;

/// Absolute pressure at `depth_m` (bar).
pub fn p_abs(depth_m: f64) -> f64 {
    depth_m / METERS_PER_BAR + SURFACE_PRESSURE_BAR
}

/// Coldest and warmest readings with the time they were taken.
#[derive(Clone, Debug, PartialEq, uniffi::Record)]
pub struct TemperatureStats {
    pub min_c: f64,
    pub min_at_s: f64,
    pub max_c: f64,
    pub max_at_s: f64,
}

/// Min/max temperature over the samples that carry one.
pub fn temperature_stats(samples: &[ProfileSample]) -> Option<TemperatureStats> {
    let mut readings = samples
        .iter()
        .filter_map(|s| s.temperature_c.map(|t| (t, s.elapsed_seconds)));
    let (t0, at0) = readings.next()?;
    let mut stats = TemperatureStats {
        min_c: t0,
        min_at_s: at0,
        max_c: t0,
        max_at_s: at0,
    };
    for (t, at) in readings {
        if t < stats.min_c {
            stats.min_c = t;
            stats.min_at_s = at;
        }
        if t > stats.max_c {
            stats.max_c = t;
            stats.max_at_s = at;
        }
    }
    Some(stats)
}

/// Metrics and annotated traces for one dive.
#[derive(Clone, Debug, PartialEq, uniffi::Record)]
pub struct PhysicsResult {
    pub max_depth_m: f64,
    pub duration_min: f64,
    pub bottom_time_min: f64,
    pub mean_absolute_pressure_bar: f64,
    pub sac_l_per_min: Option<f64>,
    pub max_ascent_speed_m_per_min: f64,
    /// One point per profile sample.
    pub ascent_trace: Vec<AscentPoint>,
    pub safety_stops: Vec<SafetyStop>,
    /// One point per profile sample.
    pub saturation_trace: Vec<SaturationPoint>,
    pub peak_tissue_pressure: TracePeak,
    pub peak_gradient: TracePeak,
    /// Table limit for the max depth, absent when deeper than the table.
    pub no_stop_limit_min: Option<f64>,
    pub decompression_required: bool,
    pub max_ppo2_bar: f64,
    pub max_ppn2_bar: f64,
    pub residual_nitrogen: ResidualNitrogen,
    pub temperature: Option<TemperatureStats>,
}

/// Run the full analysis over a profile.
pub fn analyze(profile: &DiveProfile, config: &PhysicsConfig) -> Result<PhysicsResult, PhysicsError> {
    let samples = profile.samples();
    if samples.len() < MIN_PROFILE_SAMPLES {
        return Err(PhysicsError::InsufficientData {
            samples: samples.len(),
        });
    }

    let max_depth_m = samples.iter().map(|s| s.depth_m).fold(0.0, f64::max);
    let duration_min = profile.duration_sec() / 60.0;
    let bottom_time_min = gas::bottom_time_sec(samples, config.bottom_depth_threshold_m) / 60.0;

    let mean_pressure = gas::mean_absolute_pressure(samples);
    let sac_l_per_min = gas::profile_sac(samples, bottom_time_min, mean_pressure, config);

    let ascent_trace = ascent::ascent_trace(samples, config);
    let max_ascent_speed_m_per_min = ascent::max_ascent_speed(&ascent_trace);
    let safety_stops = stops::detect_safety_stops(samples, config);

    let saturation = tissue::saturation_trace(samples, config);
    let end_tissue = saturation
        .trace
        .last()
        .map(|p| p.tissue_pressure_bar)
        .unwrap_or(saturation.peak_tissue_pressure.value);
    let residual_nitrogen = tissue::residual_nitrogen(end_tissue, config);

    let no_stop_limit_min = gas::no_stop_limit_min(&config.no_stop_table, max_depth_m);
    let gradient_exceeded = saturation.peak_gradient.value > config.max_gradient_bar;
    let table_exceeded = match no_stop_limit_min {
        Some(limit) => bottom_time_min > limit,
        None => !config.no_stop_table.is_empty(),
    };
    let decompression_required = gradient_exceeded || table_exceeded;
    if decompression_required {
        tracing::info!(
            "Decompression flagged: peak gradient {:.2} bar, bottom time {:.1} min at {:.1} m",
            saturation.peak_gradient.value,
            bottom_time_min,
            max_depth_m
        );
    }

    let result = PhysicsResult {
        max_depth_m,
        duration_min,
        bottom_time_min,
        mean_absolute_pressure_bar: mean_pressure.unwrap_or(SURFACE_PRESSURE_BAR),
        sac_l_per_min,
        max_ascent_speed_m_per_min,
        ascent_trace,
        safety_stops,
        saturation_trace: saturation.trace,
        peak_tissue_pressure: saturation.peak_tissue_pressure,
        peak_gradient: saturation.peak_gradient,
        no_stop_limit_min,
        decompression_required,
        max_ppo2_bar: gas::max_partial_pressure(samples, config.fraction_o2),
        max_ppn2_bar: gas::max_partial_pressure(samples, config.fraction_n2),
        residual_nitrogen,
        temperature: temperature_stats(samples),
    };

    tracing::debug!(
        "Analyzed {} samples: max {:.1} m, {:.1} min, {} safety stop(s)",
        samples.len(),
        result.max_depth_m,
        result.duration_min,
        result.safety_stops.len()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NoStopLimit;

    /// 18 m recreational dive with a 3.5 min stop at 5 m and tank readings.
    fn recreational_dive() -> DiveProfile {
        let mut samples = vec![ProfileSample::new(0.0, 0.0)];
        for minute in 2..=35 {
            samples.push(ProfileSample::new(f64::from(minute) * 60.0, 18.0));
        }
        samples.push(ProfileSample::new(37.0 * 60.0, 10.0));
        for step in 0..=7 {
            samples.push(ProfileSample::new(39.0 * 60.0 + f64::from(step) * 30.0, 5.0));
        }
        samples.push(ProfileSample::new(44.0 * 60.0, 0.0));

        let last = samples.len() - 1;
        for (i, s) in samples.iter_mut().enumerate() {
            s.tank_pressure_bar = Some(200.0 - 140.0 * i as f64 / last as f64);
            s.temperature_c = Some(if s.depth_m > 10.0 { 16.0 } else { 22.0 });
        }
        DiveProfile::from_samples(samples).unwrap()
    }

    #[test]
    fn test_p_abs() {
        assert_eq!(p_abs(0.0), 1.0);
        assert_eq!(p_abs(30.0), 4.0);
    }

    #[test]
    fn test_single_sample_is_insufficient() {
        let profile = DiveProfile::from_samples(vec![ProfileSample::new(0.0, 2.0)]).unwrap();
        assert_eq!(
            analyze(&profile, &PhysicsConfig::default()),
            Err(PhysicsError::InsufficientData { samples: 1 })
        );
    }

    #[test]
    fn test_recreational_dive() {
        let config = PhysicsConfig::default();
        let profile = recreational_dive();
        let result = analyze(&profile, &config).unwrap();

        assert_eq!(result.max_depth_m, 18.0);
        assert_eq!(result.duration_min, 44.0);
        assert_eq!(result.ascent_trace.len(), profile.len());
        assert_eq!(result.saturation_trace.len(), profile.len());
        assert_eq!(result.safety_stops.len(), 1);
        assert_eq!(result.safety_stops[0].depth_m, 5.0);
        assert_eq!(result.no_stop_limit_min, Some(56.0));
        assert!(!result.decompression_required);
        assert!(result.sac_l_per_min.is_some_and(|sac| sac > 0.0));
        assert!(result.mean_absolute_pressure_bar > 1.0);
        assert!((result.max_ppo2_bar - 0.21 * 2.8).abs() < 1e-12);
        assert!(
            (result.max_ppn2_bar - 0.79 * 2.8).abs() < 1e-12,
            "ppN2 at 18 m was {}",
            result.max_ppn2_bar
        );
        assert!(result.residual_nitrogen.supersaturation_pct > 0.0);

        let temperature = result.temperature.unwrap();
        assert_eq!(temperature.min_c, 16.0);
        assert_eq!(temperature.min_at_s, 120.0);
        assert_eq!(temperature.max_c, 22.0);
        assert_eq!(temperature.max_at_s, 0.0);
    }

    #[test]
    fn test_bottom_time_beyond_table_requires_deco() {
        let config = PhysicsConfig::default();
        let samples: Vec<ProfileSample> = (0..=60)
            .map(|m| ProfileSample::new(f64::from(m) * 60.0, if m == 0 { 0.0 } else { 30.0 }))
            .collect();
        let result = analyze(&DiveProfile::from_samples(samples).unwrap(), &config).unwrap();

        assert_eq!(result.no_stop_limit_min, Some(20.0));
        assert!(result.decompression_required);
    }

    #[test]
    fn test_deeper_than_table_requires_deco() {
        let config = PhysicsConfig::default();
        let samples = vec![ProfileSample::new(0.0, 0.0), ProfileSample::new(60.0, 50.0)];
        let result = analyze(&DiveProfile::from_samples(samples).unwrap(), &config).unwrap();
        assert_eq!(result.no_stop_limit_min, None);
        assert!(result.decompression_required);
    }

    #[test]
    fn test_gradient_limit_requires_deco() {
        let config = PhysicsConfig {
            max_gradient_bar: 0.1,
            no_stop_table: vec![NoStopLimit {
                depth_m: 100.0,
                max_bottom_time_min: 1000.0,
            }],
            ..PhysicsConfig::default()
        };
        let mut samples: Vec<ProfileSample> = (0..=40)
            .map(|m| ProfileSample::new(f64::from(m) * 60.0, if m == 0 { 0.0 } else { 25.0 }))
            .collect();
        samples.push(ProfileSample::new(41.0 * 60.0, 0.0));
        let result = analyze(&DiveProfile::from_samples(samples).unwrap(), &config).unwrap();

        assert!(result.peak_gradient.value > 0.1);
        assert!(result.decompression_required);
    }

    #[test]
    fn test_missing_fields_degrade_to_absent() {
        let config = PhysicsConfig::default();
        let samples = vec![
            ProfileSample::new(0.0, 0.0),
            ProfileSample::new(60.0, 10.0),
            ProfileSample::new(600.0, 10.0),
            ProfileSample::new(660.0, 0.0),
        ];
        let result = analyze(&DiveProfile::from_samples(samples).unwrap(), &config).unwrap();
        assert_eq!(result.sac_l_per_min, None);
        assert_eq!(result.temperature, None);
        assert!(result.safety_stops.is_empty());
    }
}
