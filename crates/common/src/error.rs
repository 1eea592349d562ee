//! Error types for Momos

use thiserror::Error;

use crate::schema::SchemaValidationError;

/// Result type alias using Momos Error
pub type Result<T> = std::result::Result<T, Error>;

/// Momos error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid script: {0}")]
    SchemaValidation(#[from] SchemaValidationError),

    #[error("Unsupported script version: {0}")]
    UnsupportedVersion(String),

    #[error("Sandbox {name} unavailable after {attempts} health check attempts: {last_error}")]
    SandboxUnavailable {
        name: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Script generation failed: {0}")]
    Generation(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than by
    /// the service or one of its upstreams.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::SchemaValidation(_) | Error::UnsupportedVersion(_) | Error::InvalidRequest(_)
        )
    }
}
