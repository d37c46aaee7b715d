//! Error types for the context engine
//!
//! Sensor handling itself never fails: malformed fixes and samples degrade to
//! `Poor` quality. These errors cover the fallible surfaces around it
//! (configuration, cadence strings, sensor traces, host bindings).

use thiserror::Error;

/// Errors that can occur outside the steady-state sensor path
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid recording cadence: {0}")]
    InvalidCadence(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse sensor trace: {0}")]
    ParseError(String),

    #[error("Invalid sensor event: {0}")]
    InvalidEvent(String),

    #[error("Recording session is not active")]
    SessionNotActive,
}
