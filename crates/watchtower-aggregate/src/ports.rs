//! Outbound ports: the alert governor as seen by the aggregators.
//!
//! The governor is passed in by reference at construction time; the
//! aggregators never hold a concrete governor type, so tests can observe
//! updates with a recording stub and a disabled deployment can wire the
//! [`NullObserver`].

use async_trait::async_trait;
use watchtower_types::{
    BlsCheckpointStats, CheckpointObservation, FinalityProviderStats, ValidatorSignatureStats,
};

/// Receiver of fresh validator block-signature stats.
#[async_trait]
pub trait ValidatorStatsObserver: Send + Sync {
    /// Inspect one updated record.
    async fn on_validator_stats(&self, stats: &ValidatorSignatureStats);
}

/// Receiver of fresh finality-provider vote stats.
#[async_trait]
pub trait ProviderStatsObserver: Send + Sync {
    /// Inspect one updated record.
    async fn on_provider_stats(&self, stats: &FinalityProviderStats);
}

/// Receiver of fresh BLS checkpoint stats.
#[async_trait]
pub trait CheckpointStatsObserver: Send + Sync {
    /// Inspect one persisted checkpoint, with the vote-level observation.
    async fn on_checkpoint_stats(
        &self,
        stats: &BlsCheckpointStats,
        observation: &CheckpointObservation,
    );
}

/// Observer that drops everything; used when alerting is switched off.
#[derive(Debug, Default)]
pub struct NullObserver;

#[async_trait]
impl ValidatorStatsObserver for NullObserver {
    async fn on_validator_stats(&self, _stats: &ValidatorSignatureStats) {}
}

#[async_trait]
impl ProviderStatsObserver for NullObserver {
    async fn on_provider_stats(&self, _stats: &FinalityProviderStats) {}
}

#[async_trait]
impl CheckpointStatsObserver for NullObserver {
    async fn on_checkpoint_stats(
        &self,
        _stats: &BlsCheckpointStats,
        _observation: &CheckpointObservation,
    ) {
    }
}
