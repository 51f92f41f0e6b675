//! Error types for bootstrap and supervision.

use crate::config::ConfigError;
use thiserror::Error;
use watchtower_gateway::GatewayError;

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration was missing or invalid; the process exits 1.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The node was unreachable during bootstrap.
    #[error("bootstrap health probe failed: {0}")]
    Bootstrap(#[from] GatewayError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
