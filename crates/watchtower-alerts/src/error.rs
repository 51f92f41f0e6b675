//! Error types for the alert governor.

use thiserror::Error;
use watchtower_types::SinkError;

/// Alert governor errors.
#[derive(Debug, Error)]
pub enum AlertError {
    /// The notification sink rejected an alert; the alert is dropped.
    #[error("alert delivery failed: {0}")]
    Sink(#[from] SinkError),
}

/// Result type for governor operations.
pub type AlertResult<T> = Result<T, AlertError>;
