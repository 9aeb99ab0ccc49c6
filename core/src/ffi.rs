//! Foreign-language surface exported through uniffi.
//!
//! Hosts hand over a byte buffer and its filename together with an
//! [`AnalysisConfig`] and get plain records back. Every error kind is
//! flattened into [`AnalysisError`].

use rayon::prelude::*;
use thiserror::Error;

use crate::config::AnalysisConfig;
use crate::decode::{self, DecodeWarning, ProfileFormat};
use crate::error::{ConfigError, DecodeError, PhysicsError};
use crate::models::{DiveProfile, ProfileSample};
use crate::physics::{self, PhysicsResult};

/// Error surfaced to foreign callers. The message carries the details.
#[derive(Debug, Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum AnalysisError {
    #[error("{0}")]
    UnsupportedFormat(String),
    #[error("{0}")]
    MalformedHeader(String),
    #[error("{0}")]
    TruncatedRecord(String),
    #[error("{0}")]
    MalformedXml(String),
    #[error("{0}")]
    NoSamplesParsed(String),
    #[error("{0}")]
    InsufficientData(String),
    #[error("{0}")]
    InvalidConfig(String),
}

impl From<DecodeError> for AnalysisError {
    fn from(err: DecodeError) -> Self {
        let message = err.to_string();
        match err {
            DecodeError::UnsupportedFormat { .. } => AnalysisError::UnsupportedFormat(message),
            DecodeError::MalformedHeader(_) => AnalysisError::MalformedHeader(message),
            DecodeError::TruncatedRecord { .. } => AnalysisError::TruncatedRecord(message),
            DecodeError::MalformedXml(_) => AnalysisError::MalformedXml(message),
            DecodeError::NoSamplesParsed { .. } => AnalysisError::NoSamplesParsed(message),
        }
    }
}

impl From<PhysicsError> for AnalysisError {
    fn from(err: PhysicsError) -> Self {
        match err {
            PhysicsError::InsufficientData { .. } => AnalysisError::InsufficientData(err.to_string()),
        }
    }
}

impl From<ConfigError> for AnalysisError {
    fn from(err: ConfigError) -> Self {
        AnalysisError::InvalidConfig(err.to_string())
    }
}

/// A decoded, normalized profile.
#[derive(Clone, Debug, PartialEq, uniffi::Record)]
pub struct DecodedProfile {
    pub format: ProfileFormat,
    pub samples: Vec<ProfileSample>,
    pub warnings: Vec<DecodeWarning>,
}

/// A decoded profile together with its physics analysis.
#[derive(Clone, Debug, PartialEq, uniffi::Record)]
pub struct DiveAnalysis {
    pub profile: DecodedProfile,
    pub physics: PhysicsResult,
}

/// One file of a batch.
#[derive(Clone, Debug, uniffi::Record)]
pub struct DiveFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Per-file batch outcome. Exactly one of `analysis` and `error` is set.
#[derive(Clone, Debug, uniffi::Record)]
pub struct DiveFileOutcome {
    pub filename: String,
    pub analysis: Option<DiveAnalysis>,
    pub error: Option<String>,
}

fn decode_with(
    data: &[u8],
    filename: &str,
    config: &AnalysisConfig,
) -> Result<(DecodedProfile, DiveProfile), AnalysisError> {
    let decoded = decode::decode_file(data, filename, &config.decoder)?;
    let profile = DecodedProfile {
        format: decoded.format,
        samples: decoded.profile.samples().to_vec(),
        warnings: decoded.warnings,
    };
    Ok((profile, decoded.profile))
}

fn analyze_with(
    data: &[u8],
    filename: &str,
    config: &AnalysisConfig,
) -> Result<DiveAnalysis, AnalysisError> {
    let (profile, dive) = decode_with(data, filename, config)?;
    let physics = physics::analyze(&dive, &config.physics)?;
    Ok(DiveAnalysis { profile, physics })
}

/// Decode and normalize a dive file without running the physics.
#[uniffi::export]
pub fn decode_dive_file(
    data: Vec<u8>,
    filename: String,
    config: AnalysisConfig,
) -> Result<DecodedProfile, AnalysisError> {
    config.validate()?;
    decode_with(&data, &filename, &config).map(|(profile, _)| profile)
}

/// Decode a dive file and run the physics analysis over it.
#[uniffi::export]
pub fn analyze_dive_file(
    data: Vec<u8>,
    filename: String,
    config: AnalysisConfig,
) -> Result<DiveAnalysis, AnalysisError> {
    config.validate()?;
    analyze_with(&data, &filename, &config)
}

/// Analyze many files in parallel. Failures are reported per file and
/// never abort the batch; outcomes keep the input order.
#[uniffi::export]
pub fn analyze_dive_files(
    files: Vec<DiveFile>,
    config: AnalysisConfig,
) -> Result<Vec<DiveFileOutcome>, AnalysisError> {
    config.validate()?;
    tracing::info!("Analyzing batch of {} files", files.len());

    let outcomes = files
        .par_iter()
        .map(|file| match analyze_with(&file.data, &file.filename, &config) {
            Ok(analysis) => DiveFileOutcome {
                filename: file.filename.clone(),
                analysis: Some(analysis),
                error: None,
            },
            Err(err) => {
                tracing::warn!("Skipping {}: {}", file.filename, err);
                DiveFileOutcome {
                    filename: file.filename.clone(),
                    analysis: None,
                    error: Some(err.to_string()),
                }
            }
        })
        .collect();
    Ok(outcomes)
}

/// Built-in defaults for every tunable.
#[uniffi::export]
pub fn default_analysis_config() -> AnalysisConfig {
    AnalysisConfig::default()
}

/// Parse configuration from TOML text. Missing keys take their defaults.
#[uniffi::export]
pub fn parse_analysis_config(contents: String) -> Result<AnalysisConfig, AnalysisError> {
    Ok(AnalysisConfig::from_toml_str(&contents)?)
}

/// Install the global tracing subscriber. Returns `false` if one was
/// already installed.
#[uniffi::export]
pub fn init_logging(level: String) -> bool {
    crate::logging::init_with_level(&level)
}
