//! Multi-format dive file decoding.
//!
//! A file is sniffed once into a [`ProfileFormat`], decoded by that format's
//! decoder into [`RawSample`]s, and normalized into a [`DiveProfile`].
//!
//! # Example
//!
//! ```
//! use divelog_profile::config::DecoderConfig;
//! use divelog_profile::decode::{decode_file, ProfileFormat};
//!
//! let xml = br#"<?xml version="1.0"?>
//! <log>
//!   <sample><time>0</time><depth>0.0</depth></sample>
//!   <sample><time>60</time><depth>12.5</depth></sample>
//! </log>"#;
//!
//! let decoded = decode_file(xml, "dive.xml", &DecoderConfig::default()).unwrap();
//! assert_eq!(decoded.format, ProfileFormat::GenericXml);
//! assert_eq!(decoded.profile.len(), 2);
//! ```

pub mod binlog;
pub mod fit;
pub mod sniff;
pub mod xml;

use crate::config::DecoderConfig;
use crate::error::DecodeError;
use crate::models::{DiveProfile, RawSample};
use crate::normalize::normalize;

pub use sniff::sniff;

/// Decoding strategy selected by the sniffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, uniffi::Enum)]
pub enum ProfileFormat {
    /// Garmin/Suunto FIT record stream.
    Fit,
    /// OSTC-class fixed-header binary log.
    BinaryLog,
    /// XML of unknown dialect, read through tag synonyms.
    GenericXml,
    /// Universal Dive Data Format.
    Uddf,
}

impl ProfileFormat {
    pub fn label(&self) -> &'static str {
        match self {
            ProfileFormat::Fit => "FIT",
            ProfileFormat::BinaryLog => "binary log",
            ProfileFormat::GenericXml => "generic XML",
            ProfileFormat::Uddf => "UDDF",
        }
    }

    /// File extensions conventionally used for this format.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ProfileFormat::Fit => &["fit"],
            ProfileFormat::BinaryLog => &["dl7"],
            ProfileFormat::GenericXml => &["xml"],
            ProfileFormat::Uddf => &["uddf", "xml"],
        }
    }

    /// Run this format's decoder over the whole buffer.
    pub fn decode(self, data: &[u8], config: &DecoderConfig) -> Result<DecodedSamples, DecodeError> {
        match self {
            ProfileFormat::Fit => fit::decode(data),
            ProfileFormat::BinaryLog => binlog::decode(data, config).map(DecodedSamples::complete),
            ProfileFormat::GenericXml => xml::extract_generic(data).map(DecodedSamples::complete),
            ProfileFormat::Uddf => xml::extract_uddf(data).map(DecodedSamples::complete),
        }
    }
}

/// Recoverable anomaly met while decoding.
#[derive(Clone, Debug, PartialEq, uniffi::Enum)]
pub enum DecodeWarning {
    /// The stream ended mid-record; samples before `offset` were kept.
    Truncated { offset: u64, samples_kept: u64 },
    /// The trailing checksum did not match the record bytes.
    ChecksumMismatch { expected: u16, actual: u16 },
}

/// Raw decoder output, before normalization.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedSamples {
    pub samples: Vec<RawSample>,
    pub warnings: Vec<DecodeWarning>,
}

impl DecodedSamples {
    fn complete(samples: Vec<RawSample>) -> Self {
        Self {
            samples,
            warnings: Vec::new(),
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, DecodeWarning::Truncated { .. }))
    }
}

/// A decoded, normalized file.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedFile {
    pub format: ProfileFormat,
    pub profile: DiveProfile,
    pub warnings: Vec<DecodeWarning>,
}

/// Sniff, decode and normalize one file.
pub fn decode_file(
    data: &[u8],
    filename: &str,
    config: &DecoderConfig,
) -> Result<DecodedFile, DecodeError> {
    let format = sniff(data, filename, config)?;
    let decoded = format.decode(data, config)?;
    for warning in &decoded.warnings {
        tracing::warn!("{}: {:?}", filename, warning);
    }
    let partial = if decoded.is_truncated() { " (partial)" } else { "" };

    let profile = normalize(decoded.samples)?;
    tracing::info!(
        "Decoded {} ({}) into {} samples{}",
        filename,
        format.label(),
        profile.len(),
        partial
    );

    Ok(DecodedFile {
        format,
        profile,
        warnings: decoded.warnings,
    })
}
