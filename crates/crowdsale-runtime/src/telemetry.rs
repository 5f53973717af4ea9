//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over the configured filter when it is set.

use tracing_subscriber::EnvFilter;

use crate::error::{RuntimeError, RuntimeResult};

/// Builds the filter from `RUST_LOG`, or from `fallback` when unset.
pub fn build_filter(fallback: &str) -> RuntimeResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .map_err(|e| RuntimeError::Telemetry(e.to_string()))
}

/// Installs the global fmt subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(fallback: &str) -> RuntimeResult<()> {
    let filter = build_filter(fallback)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| RuntimeError::Telemetry(e.to_string()))
}
