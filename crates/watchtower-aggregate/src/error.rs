//! Error types for the aggregators.

use thiserror::Error;
use watchtower_types::StoreError;

/// Aggregator errors.
///
/// These stay internal to the crate: a failed persistence write is logged
/// and abandoned on the processing path, never propagated into the
/// pipeline.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// A repository call failed.
    #[error("stats persistence failed: {0}")]
    Store(#[from] StoreError),
}

/// Result type for aggregator operations.
pub type AggregateResult<T> = Result<T, AggregateError>;
