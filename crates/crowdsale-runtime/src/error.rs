//! # Runtime Error Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  RuntimeError                                                           │
//! │  ├── Configuration   InvalidConfig, ConfigLoadFailed, ConfigSaveFailed  │
//! │  ├── Sale            rejected or failed sale operation (state restored) │
//! │  ├── Database        persistence failed (state restored)                │
//! │  └── Telemetry       tracing subscriber could not be installed          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crowdsale_core::SaleError;
use crowdsale_db::DbError;

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Operation Errors
    // =========================================================================
    #[error(transparent)]
    Sale(#[from] SaleError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    // =========================================================================
    // Telemetry
    // =========================================================================
    #[error("Failed to initialize tracing: {0}")]
    Telemetry(String),
}

impl From<toml::de::Error> for RuntimeError {
    fn from(err: toml::de::Error) -> Self {
        RuntimeError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for RuntimeError {
    fn from(err: toml::ser::Error) -> Self {
        RuntimeError::ConfigSaveFailed(err.to_string())
    }
}

impl RuntimeError {
    /// The sale error behind this failure, if any.
    pub fn sale_error(&self) -> Option<&SaleError> {
        match self {
            RuntimeError::Sale(err) => Some(err),
            _ => None,
        }
    }
}
