//! Error types for the shared ports.

use thiserror::Error;

/// Errors surfaced by repository implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store rejected or failed the operation.
    #[error("store backend failure: {reason}")]
    Backend { reason: String },

    /// A stored record could not be decoded.
    #[error("corrupt stored record for key {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Errors surfaced by notification sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The transport rejected or failed to deliver the alert.
    #[error("notification transport failure: {reason}")]
    Transport { reason: String },
}

/// Errors surfaced by subsystem lifecycle operations.
#[derive(Debug, Error)]
pub enum SubsystemError {
    /// The subsystem failed to start.
    #[error("{name} failed to start: {reason}")]
    StartFailed { name: &'static str, reason: String },

    /// The subsystem failed to stop cleanly.
    #[error("{name} failed to stop: {reason}")]
    StopFailed { name: &'static str, reason: String },
}
