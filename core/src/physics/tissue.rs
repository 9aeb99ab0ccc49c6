//! Single-compartment Haldane nitrogen model.
//!
//! One tissue with a fixed half-time loads and unloads nitrogen towards the
//! alveolar partial pressure `fN2 * p_abs` at the current depth. The update
//! is the closed-form exponential (Schreiner with zero rate) over each
//! sample interval, using the mean depth of the interval.

use crate::config::PhysicsConfig;
use crate::models::ProfileSample;
use crate::physics::p_abs;

/// Fraction of the excess load eliminated for the desaturation estimate.
const DESATURATION_FRACTION: f64 = 0.9;

// ============================================================================
// Output Types
// ============================================================================

/// Tissue state at one profile sample.
#[derive(Clone, Debug, PartialEq, uniffi::Record)]
pub struct SaturationPoint {
    pub elapsed_seconds: f64,
    /// Nitrogen pressure in the compartment (bar).
    pub tissue_pressure_bar: f64,
    /// Tissue pressure minus alveolar nitrogen pressure at this depth (bar).
    /// Positive while off-gassing.
    pub gradient_bar: f64,
}

/// Largest value of a trace and when it occurred.
#[derive(Clone, Copy, Debug, PartialEq, uniffi::Record)]
pub struct TracePeak {
    pub value: f64,
    pub elapsed_seconds: f64,
}

/// Nitrogen left in the compartment when the dive ends.
#[derive(Clone, Debug, PartialEq, uniffi::Record)]
pub struct ResidualNitrogen {
    pub end_tissue_pressure_bar: f64,
    /// Excess over surface equilibrium, as a percentage of equilibrium.
    pub supersaturation_pct: f64,
    pub recommended_surface_interval_min: f64,
    /// Surface time until 90% of the excess has been eliminated.
    pub desaturation_90_min: f64,
}

/// Saturation trace aligned with the profile, with its peaks.
#[derive(Clone, Debug, PartialEq)]
pub struct SaturationRun {
    pub trace: Vec<SaturationPoint>,
    pub peak_tissue_pressure: TracePeak,
    pub peak_gradient: TracePeak,
}

// ============================================================================
// Compartment State
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub(crate) struct CompartmentState {
    /// N2 pressure (bar).
    pressure_bar: f64,
    /// Rate constant (1/s).
    k: f64,
}

impl CompartmentState {
    /// Equilibrium with air at the surface.
    pub(crate) fn surface_equilibrium(fraction_n2: f64, half_time_min: f64) -> Self {
        Self {
            pressure_bar: fraction_n2 * p_abs(0.0),
            k: std::f64::consts::LN_2 / (half_time_min * 60.0),
        }
    }

    pub(crate) fn pressure_bar(&self) -> f64 {
        self.pressure_bar
    }

    /// Expose the compartment to `p_alveolar` for `dt_sec` seconds.
    pub(crate) fn update(&mut self, dt_sec: f64, p_alveolar: f64) {
        if dt_sec <= 0.0 {
            return;
        }
        self.pressure_bar = p_alveolar + (self.pressure_bar - p_alveolar) * (-self.k * dt_sec).exp();
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Run the compartment over the profile.
///
/// The first point is the initial surface equilibrium evaluated at the
/// first sample's depth. Callers guarantee at least one sample.
pub fn saturation_trace(samples: &[ProfileSample], config: &PhysicsConfig) -> SaturationRun {
    let fn2 = config.fraction_n2;
    let mut tissue =
        CompartmentState::surface_equilibrium(fn2, config.compartment_half_time_min);
    let mut trace = Vec::with_capacity(samples.len());

    for (idx, sample) in samples.iter().enumerate() {
        if idx > 0 {
            let prev = &samples[idx - 1];
            let dt_sec = sample.elapsed_seconds - prev.elapsed_seconds;
            let avg_depth_m = ((prev.depth_m + sample.depth_m) / 2.0).max(0.0);
            tissue.update(dt_sec, fn2 * p_abs(avg_depth_m));
        }

        trace.push(SaturationPoint {
            elapsed_seconds: sample.elapsed_seconds,
            tissue_pressure_bar: tissue.pressure_bar(),
            gradient_bar: tissue.pressure_bar() - fn2 * p_abs(sample.depth_m),
        });
    }

    let peak_of = |value: fn(&SaturationPoint) -> f64| {
        trace
            .iter()
            .fold(None::<TracePeak>, |best, point| {
                let v = value(point);
                match best {
                    Some(b) if b.value >= v => Some(b),
                    _ => Some(TracePeak {
                        value: v,
                        elapsed_seconds: point.elapsed_seconds,
                    }),
                }
            })
            .unwrap_or(TracePeak {
                value: 0.0,
                elapsed_seconds: 0.0,
            })
    };
    let peak_tissue_pressure = peak_of(|p| p.tissue_pressure_bar);
    let peak_gradient = peak_of(|p| p.gradient_bar);

    SaturationRun {
        trace,
        peak_tissue_pressure,
        peak_gradient,
    }
}

/// Residual nitrogen from the tissue pressure at the end of the dive.
pub fn residual_nitrogen(end_tissue_pressure_bar: f64, config: &PhysicsConfig) -> ResidualNitrogen {
    let equilibrium = config.fraction_n2 * p_abs(0.0);
    let excess = (end_tissue_pressure_bar - equilibrium).max(0.0);
    let half_time = config.compartment_half_time_min;

    // excess decays as 2^(-t / half_time)
    let desaturation_90_min = if excess > 0.0 {
        half_time * (1.0 / (1.0 - DESATURATION_FRACTION)).log2()
    } else {
        0.0
    };

    ResidualNitrogen {
        end_tissue_pressure_bar,
        supersaturation_pct: excess / equilibrium * 100.0,
        recommended_surface_interval_min: half_time * config.surface_interval_multiplier,
        desaturation_90_min,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn square_profile(depth_m: f64, minutes: u32) -> Vec<ProfileSample> {
        (0..=minutes)
            .map(|m| ProfileSample::new(f64::from(m) * 60.0, if m == 0 { 0.0 } else { depth_m }))
            .collect()
    }

    #[test]
    fn test_surface_equilibrium() {
        let config = PhysicsConfig::default();
        let samples: Vec<ProfileSample> =
            (0..=10).map(|m| ProfileSample::new(f64::from(m) * 60.0, 0.0)).collect();

        let run = saturation_trace(&samples, &config);
        for point in &run.trace {
            assert!(
                (point.tissue_pressure_bar - 0.79).abs() < 1e-12,
                "Surface tissue should stay at 0.79 bar, got {}",
                point.tissue_pressure_bar
            );
            assert!(point.gradient_bar.abs() < 1e-12);
        }
    }

    #[test]
    fn test_converges_to_alveolar_pressure() {
        let config = PhysicsConfig::default();
        // 20 half-times at 20 m
        let samples = square_profile(20.0, 800);
        let run = saturation_trace(&samples, &config);

        let target = 0.79 * 3.0;
        let last = run.trace.last().unwrap();
        assert!(
            (last.tissue_pressure_bar - target).abs() < 1e-4,
            "Tissue should converge to {target}, got {}",
            last.tissue_pressure_bar
        );
        assert!(last.gradient_bar.abs() < 1e-4);
    }

    #[test]
    fn test_monotonic_loading_at_depth() {
        let config = PhysicsConfig::default();
        let run = saturation_trace(&square_profile(30.0, 30), &config);
        for pair in run.trace.windows(2) {
            assert!(pair[1].tissue_pressure_bar >= pair[0].tissue_pressure_bar);
        }
        assert_eq!(run.peak_tissue_pressure.elapsed_seconds, 30.0 * 60.0);
    }

    #[test]
    fn test_half_time_reached() {
        let config = PhysicsConfig::default();
        let mut tissue = CompartmentState::surface_equilibrium(0.79, 40.0);
        let p_alv = 0.79 * p_abs(30.0);
        tissue.update(40.0 * 60.0, p_alv);
        let halfway = 0.79 + (p_alv - 0.79) / 2.0;
        assert!((tissue.pressure_bar() - halfway).abs() < 1e-9);
        assert_eq!(config.compartment_half_time_min, 40.0);
    }

    #[test]
    fn test_gradient_peaks_on_ascent() {
        let config = PhysicsConfig::default();
        let mut samples = square_profile(30.0, 25);
        samples.push(ProfileSample::new(26.0 * 60.0, 15.0));
        samples.push(ProfileSample::new(27.0 * 60.0, 0.0));

        let run = saturation_trace(&samples, &config);
        assert_eq!(run.peak_gradient.elapsed_seconds, 27.0 * 60.0);
        assert!(run.peak_gradient.value > 0.5);
        assert!(run.trace[1].gradient_bar < 0.0, "Descent should be on-gassing");
    }

    #[test]
    fn test_residual_after_dive() {
        let config = PhysicsConfig::default();
        let residual = residual_nitrogen(1.185, &config);
        assert!((residual.supersaturation_pct - 50.0).abs() < 1e-9);
        assert_eq!(residual.recommended_surface_interval_min, 120.0);
        assert!((residual.desaturation_90_min - 40.0 * 10f64.log2()).abs() < 1e-9);
    }

    #[test]
    fn test_residual_at_equilibrium() {
        let config = PhysicsConfig::default();
        let residual = residual_nitrogen(0.79, &config);
        assert_eq!(residual.supersaturation_pct, 0.0);
        assert_eq!(residual.desaturation_90_min, 0.0);
    }
}
