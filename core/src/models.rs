use crate::error::DecodeError;

/// One measurement as emitted by a decoder, before normalization.
#[derive(Clone, Debug, PartialEq, uniffi::Record)]
pub struct RawSample {
    pub elapsed_seconds: f64,
    pub depth_m: Option<f64>,
    pub temperature_c: Option<f64>,
    pub tank_pressure_bar: Option<f64>,
}

impl RawSample {
    pub fn new(elapsed_seconds: f64, depth_m: Option<f64>) -> Self {
        Self {
            elapsed_seconds,
            depth_m,
            temperature_c: None,
            tank_pressure_bar: None,
        }
    }
}

/// One point of a canonical profile. Depth is always known.
#[derive(Clone, Debug, PartialEq, uniffi::Record)]
pub struct ProfileSample {
    pub elapsed_seconds: f64,
    pub depth_m: f64,
    pub temperature_c: Option<f64>,
    pub tank_pressure_bar: Option<f64>,
}

impl ProfileSample {
    pub fn new(elapsed_seconds: f64, depth_m: f64) -> Self {
        Self {
            elapsed_seconds,
            depth_m,
            temperature_c: None,
            tank_pressure_bar: None,
        }
    }
}

/// Time-ordered depth profile with at most one sample per timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct DiveProfile {
    samples: Vec<ProfileSample>,
}

impl DiveProfile {
    /// Wraps samples that are already sorted and deduplicated.
    pub(crate) fn from_sorted(samples: Vec<ProfileSample>) -> Self {
        debug_assert!(samples
            .windows(2)
            .all(|w| w[0].elapsed_seconds < w[1].elapsed_seconds));
        Self { samples }
    }

    /// Build a profile from caller-supplied samples.
    ///
    /// Samples are sorted and deduplicated the same way the normalizer does,
    /// but a single sample is accepted. Only an empty input is rejected.
    pub fn from_samples(samples: Vec<ProfileSample>) -> Result<Self, DecodeError> {
        if samples.is_empty() {
            return Err(DecodeError::NoSamplesParsed { usable: 0 });
        }
        Ok(Self::from_sorted(crate::normalize::sort_and_dedup(samples)))
    }

    pub fn samples(&self) -> &[ProfileSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Elapsed time between the first and last sample, in seconds.
    pub fn duration_sec(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.elapsed_seconds - first.elapsed_seconds,
            _ => 0.0,
        }
    }

    pub fn into_samples(self) -> Vec<ProfileSample> {
        self.samples
    }
}
