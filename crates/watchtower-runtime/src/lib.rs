//! # Watchtower Runtime - Bootstrap and Supervision
//!
//! The top of the dependency tree: loads configuration from the
//! environment, builds one [`Orchestrator`] per configured network, and
//! supervises their lifecycles. Orchestrators are fully independent and
//! share no mutable state; the only shared values are the store handles
//! and the shutdown signal.

pub mod config;
pub mod error;
pub mod orchestrator;

pub use config::{AppConfig, ConfigError, NetworkConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use orchestrator::{Orchestrator, Stores};
