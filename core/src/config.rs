//! Analysis configuration.
//!
//! The core never reads ambient configuration: the host builds an
//! [`AnalysisConfig`] once (usually from a TOML file) and passes it by
//! reference into decoding and physics calls.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Complete configuration consumed by the decoder and the physics engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub decoder: DecoderConfig,

    #[serde(default)]
    pub physics: PhysicsConfig,
}

/// Limits and layouts used while sniffing and decoding files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, uniffi::Record)]
#[serde(default)]
pub struct DecoderConfig {
    /// Deepest plausible depth (m); deeper headers or samples are rejected.
    pub max_depth_m: f64,
    /// Upper bound on the sample count declared by a binary log header.
    pub max_samples: u32,
    /// How many leading bytes are searched for the UDDF root/namespace token.
    pub sniff_window_bytes: u32,
    /// Known binary log layouts, keyed by the header's layout version byte.
    pub log_layouts: Vec<LogLayout>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_depth_m: 200.0,
            max_samples: 86_400,
            sniff_window_bytes: 1024,
            log_layouts: LogLayout::builtin(),
        }
    }
}

/// Byte layout of one binary log firmware revision.
///
/// Header integers are little-endian: the sample count and max depth are
/// `u16`, the interval and record size `u8`. Per record, depth and pressure
/// are `u16` and temperature `i16`, each multiplied by its scale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct LogLayout {
    pub version: u8,
    pub header_len: u32,
    pub sample_count_offset: u32,
    pub interval_offset: u32,
    pub record_size_offset: u32,
    pub max_depth_offset: u32,
    pub max_depth_scale: f64,
    pub depth_offset: u32,
    pub depth_scale: f64,
    pub temperature_offset: Option<u32>,
    pub temperature_scale: f64,
    pub pressure_offset: Option<u32>,
    pub pressure_scale: f64,
}

impl LogLayout {
    /// Layouts for the two known firmware revisions.
    ///
    /// Version 1 records carry depth (cm) and temperature (0.1 °C); version 2
    /// appends tank pressure (0.1 bar).
    pub fn builtin() -> Vec<LogLayout> {
        let v1 = LogLayout {
            version: 1,
            header_len: 16,
            sample_count_offset: 3,
            interval_offset: 5,
            record_size_offset: 6,
            max_depth_offset: 7,
            max_depth_scale: 0.01,
            depth_offset: 0,
            depth_scale: 0.01,
            temperature_offset: Some(2),
            temperature_scale: 0.1,
            pressure_offset: None,
            pressure_scale: 0.1,
        };
        let v2 = LogLayout {
            version: 2,
            header_len: 24,
            pressure_offset: Some(4),
            ..v1.clone()
        };
        vec![v1, v2]
    }

    /// Smallest record size able to hold every declared field.
    pub fn min_record_size(&self) -> u64 {
        [
            Some(self.depth_offset),
            self.temperature_offset,
            self.pressure_offset,
        ]
        .into_iter()
        .flatten()
        .map(|off| u64::from(off) + 2)
        .max()
        .unwrap_or(2)
    }
}

/// Inclusive depth band in metres.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct DepthRange {
    pub min_m: f64,
    pub max_m: f64,
}

impl DepthRange {
    pub fn contains(&self, depth_m: f64) -> bool {
        depth_m >= self.min_m && depth_m <= self.max_m
    }
}

/// One row of the no-stop table: the longest bottom time allowed without
/// decompression stops for dives no deeper than `depth_m`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct NoStopLimit {
    pub depth_m: f64,
    pub max_bottom_time_min: f64,
}

/// Parameters of the decompression-physics model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, uniffi::Record)]
#[serde(default)]
pub struct PhysicsConfig {
    pub fraction_o2: f64,
    pub fraction_n2: f64,
    pub compartment_half_time_min: f64,
    pub tank_volume_l: f64,
    pub safety_depth_range_m: DepthRange,
    pub safety_min_duration_s: f64,
    /// Qualifying stops separated by at most this gap are reported as one.
    pub safety_merge_gap_s: f64,
    pub safe_ascent_m_per_min: f64,
    pub warning_ascent_m_per_min: f64,
    /// Ascent speeds are clipped to this magnitude to absorb sensor spikes.
    pub max_plausible_ascent_m_per_min: f64,
    pub bottom_depth_threshold_m: f64,
    /// Tissue-over-ambient gradient above which decompression is flagged.
    pub max_gradient_bar: f64,
    pub no_stop_table: Vec<NoStopLimit>,
    /// Half-times of surface interval recommended after the dive.
    pub surface_interval_multiplier: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            fraction_o2: 0.21,
            fraction_n2: 0.79,
            compartment_half_time_min: 40.0,
            tank_volume_l: 12.0,
            safety_depth_range_m: DepthRange {
                min_m: 3.0,
                max_m: 6.0,
            },
            safety_min_duration_s: 180.0,
            safety_merge_gap_s: 30.0,
            safe_ascent_m_per_min: 10.0,
            warning_ascent_m_per_min: 15.0,
            max_plausible_ascent_m_per_min: 30.0,
            bottom_depth_threshold_m: 3.0,
            max_gradient_bar: 1.0,
            no_stop_table: default_no_stop_table(),
            surface_interval_multiplier: 3.0,
        }
    }
}

fn default_no_stop_table() -> Vec<NoStopLimit> {
    [
        (10.0, 219.0),
        (12.0, 147.0),
        (14.0, 98.0),
        (16.0, 72.0),
        (18.0, 56.0),
        (20.0, 45.0),
        (22.0, 37.0),
        (25.0, 29.0),
        (30.0, 20.0),
        (35.0, 14.0),
        (40.0, 9.0),
        (42.0, 8.0),
    ]
    .into_iter()
    .map(|(depth_m, max_bottom_time_min)| NoStopLimit {
        depth_m,
        max_bottom_time_min,
    })
    .collect()
}

impl AnalysisConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        tracing::info!("Loaded analysis config from {:?}", path);
        Ok(config)
    }

    /// Parse and validate configuration from TOML text. Missing keys take
    /// their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.decoder.validate()?;
        self.physics.validate()
    }
}

impl DecoderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_depth_m > 0.0) {
            return Err(invalid("decoder.max_depth_m must be positive"));
        }
        if self.max_samples == 0 {
            return Err(invalid("decoder.max_samples must be positive"));
        }
        if self.sniff_window_bytes < 16 {
            return Err(invalid("decoder.sniff_window_bytes must be at least 16"));
        }
        for (i, layout) in self.log_layouts.iter().enumerate() {
            if self.log_layouts[..i]
                .iter()
                .any(|other| other.version == layout.version)
            {
                return Err(invalid(format!(
                    "duplicate binary log layout version {}",
                    layout.version
                )));
            }
            let header_fields = [
                u64::from(layout.sample_count_offset) + 2,
                u64::from(layout.interval_offset) + 1,
                u64::from(layout.record_size_offset) + 1,
                u64::from(layout.max_depth_offset) + 2,
            ];
            if header_fields
                .iter()
                .any(|&end| end > u64::from(layout.header_len))
            {
                return Err(invalid(format!(
                    "binary log layout {} has header fields beyond header_len",
                    layout.version
                )));
            }
            // record size is a single header byte
            if layout.min_record_size() > u64::from(u8::MAX) {
                return Err(invalid(format!(
                    "binary log layout {} has record fields beyond 255 bytes",
                    layout.version
                )));
            }
        }
        Ok(())
    }
}

impl PhysicsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fraction_ok = |f: f64| f > 0.0 && f <= 1.0;
        if !fraction_ok(self.fraction_o2) || !fraction_ok(self.fraction_n2) {
            return Err(invalid("gas fractions must be in (0, 1]"));
        }
        if self.fraction_o2 + self.fraction_n2 > 1.0 + 1e-9 {
            return Err(invalid("fraction_o2 + fraction_n2 must not exceed 1"));
        }
        if !(self.compartment_half_time_min > 0.0) {
            return Err(invalid("compartment_half_time_min must be positive"));
        }
        if !(self.tank_volume_l > 0.0) {
            return Err(invalid("tank_volume_l must be positive"));
        }
        let range = self.safety_depth_range_m;
        if range.min_m < 0.0 || range.min_m > range.max_m {
            return Err(invalid("safety_depth_range_m must satisfy 0 <= min_m <= max_m"));
        }
        if self.safety_min_duration_s < 0.0 || self.safety_merge_gap_s < 0.0 {
            return Err(invalid("safety stop durations must not be negative"));
        }
        if !(self.safe_ascent_m_per_min > 0.0)
            || self.warning_ascent_m_per_min < self.safe_ascent_m_per_min
        {
            return Err(invalid(
                "ascent thresholds must satisfy 0 < safe <= warning",
            ));
        }
        if !(self.max_plausible_ascent_m_per_min > 0.0) {
            return Err(invalid("max_plausible_ascent_m_per_min must be positive"));
        }
        if self.bottom_depth_threshold_m < 0.0 {
            return Err(invalid("bottom_depth_threshold_m must not be negative"));
        }
        if self
            .no_stop_table
            .windows(2)
            .any(|w| w[0].depth_m >= w[1].depth_m)
        {
            return Err(invalid("no_stop_table depths must be strictly increasing"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
