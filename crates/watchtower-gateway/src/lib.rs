//! # Watchtower Gateway - Chain-Facing I/O
//!
//! The resilient bidirectional channel to a Babylon node for a single
//! network:
//!
//! - [`RestClient`]: request/response over REST with round-robin endpoint
//!   rotation; a full rotation without success is a terminal error.
//! - [`EventSubscription`]: long-lived JSON-RPC WebSocket stream with
//!   exponential backoff reconnect; after the attempt threshold the client
//!   rotates to the next stream endpoint and resets the counter.
//! - [`router`]: stateless demultiplexer turning raw frames into
//!   [`ChainEvent`]s for the pipelines.
//! - [`chaindata`]: tolerant decoders for chain payloads; camelCase and
//!   snake_case co-exist and optional fields may be absent.
//!
//! The gateway delivers events in the order the server emits them; it does
//! not reorder or deduplicate. Reconnections may skip heights, which the
//! block pipeline recovers through gap catch-up.

pub mod chaindata;
pub mod error;
pub mod rest;
pub mod router;
pub mod ws;

pub use chaindata::{
    ActiveProvider, Block, BlockIdFlag, CatalogProvider, CommitSignature, CurrentEpochResponse,
    InjectedCheckpoint, StakingValidator, VoteExtension,
};
pub use error::{GatewayError, GatewayResult};
pub use rest::RestClient;
pub use router::{route_frame, ChainEvent};
pub use ws::{EventSubscription, SubscriptionFilter, EVENT_CHANNEL_CAPACITY};
