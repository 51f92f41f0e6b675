//! Error types for the processing pipelines.

use thiserror::Error;
use watchtower_gateway::GatewayError;

/// Pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A chain fetch failed after full endpoint rotation.
    #[error("chain fetch failed: {0}")]
    Gateway(#[from] GatewayError),

    /// No injected checkpoint was found at any scanned offset.
    #[error("no injected checkpoint found for epoch {epoch} in {scanned} heights from {start}")]
    CheckpointNotFound {
        epoch: u64,
        start: u64,
        scanned: u64,
    },
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
