//! Finality-provider vote aggregation over observed height ranges.

use crate::ports::ProviderStatsObserver;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use watchtower_directory::Directory;
use watchtower_pipeline::BlockObservationHandler;
use watchtower_types::{
    BlockObservation, FinalityProviderStats, FinalityProviderStatsRepository, Network, Subsystem,
    SubsystemError,
};

/// Finality-provider aggregator tuning knobs.
#[derive(Debug, Clone)]
pub struct ProviderAggregatorConfig {
    /// Master switch; a disabled aggregator ignores observations.
    pub enabled: bool,
    /// Bound on the missed-height list, newest retained.
    pub missed_heights_cap: usize,
    /// Capacity of the in-memory stats cache.
    pub cache_cap: usize,
}

impl Default for ProviderAggregatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            missed_heights_cap: 100,
            cache_cap: 1_024,
        }
    }
}

/// Create the record for a provider's first observed height.
pub fn new_provider_record(
    btc_pk_hex: &str,
    network: Network,
    height: u64,
    timestamp: u64,
    signed: bool,
) -> FinalityProviderStats {
    let mut stats = FinalityProviderStats {
        btc_pk_hex: btc_pk_hex.to_string(),
        network,
        moniker: String::new(),
        start_height: height,
        end_height: height,
        total_blocks: 1,
        signed_blocks: u64::from(signed),
        missed_blocks: u64::from(!signed),
        signature_rate: 0.0,
        missed_block_heights: if signed { Vec::new() } else { vec![height] },
        jailed: false,
        is_active: false,
        last_updated: timestamp,
    };
    stats.recompute_rate();
    stats
}

/// Apply one `(height, signed)` observation to an existing record.
pub fn apply_provider_observation(
    stats: &mut FinalityProviderStats,
    height: u64,
    timestamp: u64,
    signed: bool,
    missed_heights_cap: usize,
) {
    stats.total_blocks += 1;
    if signed {
        stats.signed_blocks += 1;
    } else {
        stats.missed_blocks += 1;
        stats.missed_block_heights.push(height);
        while stats.missed_block_heights.len() > missed_heights_cap {
            stats.missed_block_heights.remove(0);
        }
    }
    stats.end_height = stats.end_height.max(height);
    stats.recompute_rate();
    stats.last_updated = stats.last_updated.max(timestamp);
}

/// Vote aggregator for one network's finality providers.
///
/// Observes the union of the directory's active set and whoever actually
/// voted on the height. Heights whose vote set could not be fetched are
/// skipped whole rather than recorded as universal misses.
pub struct FinalityProviderAggregator {
    network: Network,
    config: ProviderAggregatorConfig,
    directory: Arc<Directory>,
    repo: Arc<dyn FinalityProviderStatsRepository>,
    observer: Arc<dyn ProviderStatsObserver>,
    cache: Mutex<LruCache<String, FinalityProviderStats>>,
}

impl FinalityProviderAggregator {
    /// Create an aggregator with an empty cache.
    pub fn new(
        network: Network,
        config: ProviderAggregatorConfig,
        directory: Arc<Directory>,
        repo: Arc<dyn FinalityProviderStatsRepository>,
        observer: Arc<dyn ProviderStatsObserver>,
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

    /// Update every observed provider against one block observation.
    pub async fn process(&self, observation: &BlockObservation) {
        if !self.config.enabled {
            return;
        }
        let Some(fp_signers) = &observation.fp_signers else {
            debug!(
                network = %self.network,
                height = observation.height,
                "vote set unavailable, height skipped"
            );
            return;
        };

        let mut subjects: HashSet<String> =
            self.directory.active_provider_keys().into_iter().collect();
        subjects.extend(fp_signers.iter().cloned());

        for btc_pk_hex in subjects {
            let signed = fp_signers.contains(&btc_pk_hex);
            let mut stats = match self.load(&btc_pk_hex).await {
                Some(mut stats) => {
                    apply_provider_observation(
                        &mut stats,
                        observation.height,
                        observation.timestamp,
                        signed,
                        self.config.missed_heights_cap,
                    );
                    stats
                }
                None => new_provider_record(
                    &btc_pk_hex,
                    self.network,
                    observation.height,
                    observation.timestamp,
                    signed,
                ),
            };

            if let Some((jailed, is_active)) = self.directory.provider_flags(&btc_pk_hex) {
                stats.jailed = jailed;
                stats.is_active = is_active;
            }
            if let Some(moniker) = self.directory.provider_moniker(&btc_pk_hex) {
                if !moniker.is_empty() {
                    stats.moniker = moniker;
                }
            }

            self.cache.lock().put(btc_pk_hex.clone(), stats.clone());
            if let Err(e) = self.repo.upsert(&stats).await {
                warn!(
                    network = %self.network,
                    subject = %btc_pk_hex,
                    error = %e,
                    "stats write abandoned, cache stays authoritative"
                );
            }
            self.observer.on_provider_stats(&stats).await;
        }
        debug!(network = %self.network, height = observation.height, "provider stats updated");
    }

    async fn load(&self, btc_pk_hex: &str) -> Option<FinalityProviderStats> {
        if let Some(stats) = self.cache.lock().get(btc_pk_hex) {
            return Some(stats.clone());
        }
        match self.repo.get(self.network, btc_pk_hex).await {
            Ok(found) => found,
            Err(e) => {
                warn!(subject = btc_pk_hex, error = %e, "stats read failed, starting empty");
                None
            }
        }
    }
}

#[async_trait]
impl BlockObservationHandler for FinalityProviderAggregator {
    async fn handle_block(&self, observation: &BlockObservation) {
        self.process(observation).await;
    }
}

#[async_trait]
impl Subsystem for FinalityProviderAggregator {
    fn name(&self) -> &'static str {
        "finality-provider-aggregator"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        info!(network = %self.network, "finality provider aggregator started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        info!(network = %self.network, "finality provider aggregator stopped");
        Ok(())
    }
}
