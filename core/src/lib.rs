pub mod config;
pub mod decode;
pub mod error;
pub mod ffi;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod physics;

uniffi::setup_scaffolding!();

pub use config::{AnalysisConfig, DecoderConfig, LogLayout, PhysicsConfig};
pub use decode::{decode_file, DecodeWarning, DecodedFile, ProfileFormat};
pub use error::{ConfigError, DecodeError, PhysicsError};
pub use ffi::AnalysisError;
pub use models::{DiveProfile, ProfileSample, RawSample};
pub use normalize::normalize;
pub use physics::{analyze, PhysicsResult};
