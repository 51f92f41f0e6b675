//! Sliding-window block-signature aggregation per validator.

use crate::ports::ValidatorStatsObserver;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use watchtower_directory::Directory;
use watchtower_pipeline::BlockObservationHandler;
use watchtower_types::{
    BlockObservation, Network, RecentBlock, Subsystem, SubsystemError, ValidatorSignatureStats,
    ValidatorStatsRepository,
};

/// Validator aggregator tuning knobs.
#[derive(Debug, Clone)]
pub struct ValidatorAggregatorConfig {
    /// Master switch; a disabled aggregator ignores observations.
    pub enabled: bool,
    /// Performance window size W.
    pub window: u64,
    /// Bound R on the recent-block history.
    pub recent_limit: usize,
    /// Capacity of the in-memory stats cache.
    pub cache_cap: usize,
}

impl Default for ValidatorAggregatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 10_000,
            recent_limit: 100,
            cache_cap: 2_048,
        }
    }
}

/// Apply one `(height, timestamp, round, signed)` observation to a record.
///
/// The recent history is newest-first and truncated to `recent_limit`.
/// The window counter saturates at `window`; once saturated the signed
/// counter is held constant rather than re-balanced against evicted
/// observations, so the post-saturation rate drifts from a true sliding
/// average. That saturation behavior is deliberate and load-bearing for
/// downstream consumers.
pub fn apply_observation(
    stats: &mut ValidatorSignatureStats,
    height: u64,
    timestamp: u64,
    round: u32,
    signed: bool,
    moniker: &str,
    window: u64,
    recent_limit: usize,
) {
    if !moniker.is_empty() {
        stats.moniker = moniker.to_string();
    }

    stats.recent_blocks.insert(
        0,
        RecentBlock {
            height,
            signed,
            round,
            timestamp,
        },
    );
    stats.recent_blocks.truncate(recent_limit);

    if signed {
        stats.consecutive_signed += 1;
        stats.consecutive_missed = 0;
    } else {
        stats.consecutive_missed += 1;
        stats.consecutive_signed = 0;
    }

    stats.total_blocks_in_window = (stats.total_blocks_in_window + 1).min(window);
    if signed && stats.total_blocks_in_window < window {
        stats.total_signed_blocks += 1;
    }
    stats.recompute_rate();
    stats.last_updated = stats.last_updated.max(timestamp);
}

/// Block-signature aggregator for one network.
pub struct ValidatorSignatureAggregator {
    network: Network,
    config: ValidatorAggregatorConfig,
    directory: Arc<Directory>,
    repo: Arc<dyn ValidatorStatsRepository>,
    observer: Arc<dyn ValidatorStatsObserver>,
    cache: Mutex<LruCache<String, ValidatorSignatureStats>>,
}

impl ValidatorSignatureAggregator {
    /// Create an aggregator with an empty cache.
    pub fn new(
        network: Network,
        config: ValidatorAggregatorConfig,
        directory: Arc<Directory>,
        repo: Arc<dyn ValidatorStatsRepository>,
        observer: Arc<dyn ValidatorStatsObserver>,
    ) -> Self {
        let cap = NonZeroUsize::new(config.cache_cap).unwrap_or(NonZeroUsize::MIN);
        Self {
            network,
            config,
            directory,
            repo,
            observer,
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Update every bonded validator against one block observation.
    pub async fn process(&self, observation: &BlockObservation) {
        if !self.config.enabled {
            return;
        }
        for (consensus_hex, moniker) in self.directory.bonded_validator_keys() {
            let signed = observation.signers.contains(&consensus_hex);
            let mut stats = self.load(&consensus_hex).await;
            apply_observation(
                &mut stats,
                observation.height,
                observation.timestamp,
                observation.round,
                signed,
                &moniker,
                self.config.window,
                self.config.recent_limit,
            );
            self.cache.lock().put(consensus_hex.clone(), stats.clone());
            if let Err(e) = self.repo.upsert(&stats).await {
                warn!(
                    network = %self.network,
                    subject = %consensus_hex,
                    error = %e,
                    "stats write abandoned, cache stays authoritative"
                );
            }
            self.observer.on_validator_stats(&stats).await;
        }
        debug!(network = %self.network, height = observation.height, "validator stats updated");
    }

    async fn load(&self, consensus_hex: &str) -> ValidatorSignatureStats {
        if let Some(stats) = self.cache.lock().get(consensus_hex) {
            return stats.clone();
        }
        match self.repo.get(self.network, consensus_hex).await {
            Ok(Some(stats)) => stats,
            Ok(None) => ValidatorSignatureStats::empty(consensus_hex, self.network),
            Err(e) => {
                warn!(subject = consensus_hex, error = %e, "stats read failed, starting empty");
                ValidatorSignatureStats::empty(consensus_hex, self.network)
            }
        }
    }
}

#[async_trait]
impl BlockObservationHandler for ValidatorSignatureAggregator {
    async fn handle_block(&self, observation: &BlockObservation) {
        self.process(observation).await;
    }
}

#[async_trait]
impl Subsystem for ValidatorSignatureAggregator {
    fn name(&self) -> &'static str {
        "validator-signature-aggregator"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        info!(network = %self.network, "validator signature aggregator started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        info!(network = %self.network, "validator signature aggregator stopped");
        Ok(())
    }
}
