//! Error types for the directory subsystem.

use thiserror::Error;
use watchtower_gateway::GatewayError;
use watchtower_types::StoreError;

/// Directory subsystem errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// A catalog fetch against the chain failed.
    #[error("catalog fetch failed: {0}")]
    Gateway(#[from] GatewayError),

    /// A record failed to persist.
    #[error("identity persistence failed: {0}")]
    Store(#[from] StoreError),

    /// A consensus public key could not be decoded.
    #[error("bad consensus key for {subject}: {reason}")]
    BadConsensusKey { subject: String, reason: String },
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
