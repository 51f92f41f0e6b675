//! # Babylon Watchtower Test Suite
//!
//! Unified test crate containing:
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── scenarios.rs      # End-to-end participation scenarios
//!     └── governor_laws.rs  # Alert governor laws across the full chain
//! ```
//!
//! Every test runs against the in-memory store, a recording sink, and a
//! manual clock; no network access is required.

pub mod integration;
