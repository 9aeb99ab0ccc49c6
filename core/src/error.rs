use thiserror::Error;

/// Error type for format detection, decoding and normalization.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("unsupported format: no known signature in {filename}")]
    UnsupportedFormat { filename: String },

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("truncated record at byte {offset}: needed {needed} more bytes")]
    TruncatedRecord { offset: usize, needed: usize },

    #[error("malformed xml: {0}")]
    MalformedXml(String),

    #[error("no samples parsed: {usable} usable sample(s), at least 2 required")]
    NoSamplesParsed { usable: usize },
}

/// Error type for the physics engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("insufficient data: {samples} sample(s), at least 2 required")]
    InsufficientData { samples: usize },
}

/// Error type for loading and validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
