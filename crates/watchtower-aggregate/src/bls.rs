//! BLS checkpoint aggregation: persisted per epoch as delivered.

use crate::ports::CheckpointStatsObserver;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use watchtower_pipeline::CheckpointObservationHandler;
use watchtower_types::{
    stats::format_rate, BlsCheckpointStats, BlsStatsRepository, CheckpointObservation, Clock,
    Network, Subsystem, SubsystemError,
};

/// BLS aggregator tuning knobs.
#[derive(Debug, Clone)]
pub struct BlsAggregatorConfig {
    /// Master switch; a disabled aggregator ignores observations.
    pub enabled: bool,
}

impl Default for BlsAggregatorConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Reduce a checkpoint observation to its persisted stats record.
pub fn build_checkpoint_stats(
    network: Network,
    observation: &CheckpointObservation,
    timestamp: u64,
) -> BlsCheckpointStats {
    let total_validators = observation.votes.len() as u64;
    let total_power = observation.total_power();
    let signed_power = observation.signed_power();
    let signed_count = observation.signed_count() as u64;

    let by_count = if total_validators > 0 {
        100.0 * signed_count as f64 / total_validators as f64
    } else {
        0.0
    };
    let by_power = if total_power > 0 {
        100.0 * signed_power as f64 / total_power as f64
    } else {
        0.0
    };

    BlsCheckpointStats {
        epoch: observation.epoch,
        network,
        total_validators,
        total_power,
        signed_power,
        unsigned_power: total_power - signed_power,
        participation_rate_by_count: format_rate(by_count),
        participation_rate_by_power: format_rate(by_power),
        timestamp,
    }
}

/// Checkpoint aggregator for one network; no online aggregation.
pub struct BlsCheckpointAggregator {
    network: Network,
    config: BlsAggregatorConfig,
    repo: Arc<dyn BlsStatsRepository>,
    observer: Arc<dyn CheckpointStatsObserver>,
    clock: Arc<dyn Clock>,
}

impl BlsCheckpointAggregator {
    /// Create the aggregator.
    pub fn new(
        network: Network,
        config: BlsAggregatorConfig,
        repo: Arc<dyn BlsStatsRepository>,
        observer: Arc<dyn CheckpointStatsObserver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            network,
            config,
            repo,
            observer,
            clock,
        }
    }

    /// Persist one checkpoint observation and notify the governor.
    pub async fn process(&self, observation: &CheckpointObservation) {
        if !self.config.enabled {
            return;
        }
        let stats = build_checkpoint_stats(self.network, observation, self.clock.now_ms());
        if let Err(e) = self.repo.upsert(&stats).await {
            warn!(
                network = %self.network,
                epoch = stats.epoch,
                error = %e,
                "checkpoint stats write abandoned"
            );
        }
        info!(
            network = %self.network,
            epoch = stats.epoch,
            by_power = %stats.participation_rate_by_power,
            by_count = %stats.participation_rate_by_count,
            "checkpoint participation recorded"
        );
        self.observer.on_checkpoint_stats(&stats, observation).await;
    }
}

#[async_trait]
impl CheckpointObservationHandler for BlsCheckpointAggregator {
    async fn handle_checkpoint(&self, observation: &CheckpointObservation) {
        self.process(observation).await;
    }
}

#[async_trait]
impl Subsystem for BlsCheckpointAggregator {
    fn name(&self) -> &'static str {
        "bls-checkpoint-aggregator"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        info!(network = %self.network, "bls checkpoint aggregator started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        info!(network = %self.network, "bls checkpoint aggregator stopped");
        Ok(())
    }
}
