//! Error types for riffwatch-core

use std::time::Duration;
use thiserror::Error;

/// Main error type for the riffwatch-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Telemetry transport failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Telemetry payload could not be normalized
    #[error("normalize error: {0}")]
    Normalize(#[from] NormalizeError),

    /// Tip store read/write failure
    #[error("persistence error: {0}")]
    Persistence(String),

    /// External tip generator failure
    #[error("generator error: {0}")]
    Generator(String),
}

/// Failures produced by a telemetry transport.
///
/// All variants are recoverable: the polling loop serves the last known-good
/// snapshot and tries again on the next tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connect retries exhausted
    #[error("telemetry source unreachable after {attempts} attempt(s)")]
    Unreachable { attempts: u32 },

    /// Established connection dropped, returned nothing, or sent a bad frame
    #[error("telemetry connection lost: {0}")]
    ConnectionLost(String),

    /// A single read exceeded its bound
    #[error("telemetry fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// Failures produced by the snapshot normalizer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// Payload is not structured data at all
    #[error("malformed telemetry payload: {0}")]
    Malformed(String),
}

/// Result type alias for riffwatch-core
pub type Result<T> = std::result::Result<T, Error>;
