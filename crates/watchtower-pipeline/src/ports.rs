//! Outbound ports: where observations go once a pipeline produced them.

use async_trait::async_trait;
use watchtower_types::{BlockObservation, CheckpointObservation};

/// Consumer of per-height block observations.
///
/// Handlers run on the pipeline task, in registration order, and receive
/// observations in strictly ascending height order. A handler owns its
/// failure handling; a lost store write must not stall the pipeline.
#[async_trait]
pub trait BlockObservationHandler: Send + Sync {
    /// Consume one block observation.
    async fn handle_block(&self, observation: &BlockObservation);
}

/// Consumer of per-epoch checkpoint observations.
#[async_trait]
pub trait CheckpointObservationHandler: Send + Sync {
    /// Consume one checkpoint observation.
    async fn handle_checkpoint(&self, observation: &CheckpointObservation);
}
