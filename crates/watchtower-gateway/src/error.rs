//! Error types for the chain gateway.

use thiserror::Error;

/// Chain gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Every configured REST endpoint failed for one request.
    #[error("all {tried} REST endpoints failed for {path}: {last_error}")]
    AllEndpointsFailed {
        path: String,
        tried: usize,
        last_error: String,
    },

    /// Transport-level HTTP failure against a single endpoint.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx status from the node.
    #[error("endpoint returned status {status} for {path}")]
    Status { status: u16, path: String },

    /// A response body could not be decoded.
    #[error("failed to decode response from {path}: {reason}")]
    Decode { path: String, reason: String },

    /// The WebSocket connection or subscription failed.
    #[error("event stream failure: {reason}")]
    Stream { reason: String },

    /// No endpoints were configured.
    #[error("no {kind} endpoints configured")]
    NoEndpoints { kind: &'static str },
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
