//! # Watchtower Directory - Signer Identity Catalog
//!
//! Maintains the active validator set and finality-provider set for one
//! network and translates any known key form to a canonical record:
//!
//! - Validators resolve by operator address, consensus bech32 address,
//!   consensus hex, or base64 consensus key; all forms hit the same record.
//! - Finality providers resolve by BTC public key hex.
//! - Unknown keys return `None` without error.
//!
//! [`Directory::refresh`] fetches the full paginated catalogs, derives the
//! consensus address forms, swaps the in-memory catalog atomically, and
//! persists every record. Jailed-flag changes between refreshes surface as
//! [`DirectoryEvent`]s on the orchestrator's channel; the first sighting of
//! a subject establishes its baseline silently.

pub mod address;
pub mod catalog;
pub mod error;
pub mod service;

pub use address::derive_consensus_addresses;
pub use catalog::Catalog;
pub use error::{DirectoryError, DirectoryResult};
pub use service::{Directory, DirectoryEvent, RefreshSummary, SubjectKind};
