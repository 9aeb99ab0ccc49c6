//! Tracing setup for hosts embedding the core.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the host, which can call [`init`] or go through the FFI
//! `init_logging` export.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging at INFO, overridable with `RUST_LOG`.
pub fn init() {
    init_with_level("info");
}

/// Initialize logging with a specific default level.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_with_level(default_level: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init()
        .is_ok()
}

/// Initialize logging for tests (captured per test).
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
