//! Momos Common Library
//!
//! Action script schema, the trace and telemetry data model, stdout framing
//! and the error taxonomy shared by the runner, the service and the CLI.

pub mod error;
pub mod framing;
pub mod schema;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use framing::Frame;
pub use schema::{
    Action, ActionKind, ActionScript, SchemaErrorKind, SchemaValidationError, ScriptVersion,
    MAX_SLEEP_MS, SUPPORTED_VERSION,
};
pub use types::*;

/// Momos version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
