//! Per-network supervisor wiring every subsystem together.

use crate::config::{AppConfig, NetworkConfig};
use crate::error::RuntimeResult;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use watchtower_aggregate::{
    BlsAggregatorConfig, BlsCheckpointAggregator, FinalityProviderAggregator,
    ProviderAggregatorConfig, ValidatorAggregatorConfig, ValidatorSignatureAggregator,
};
use watchtower_alerts::{AlertGovernor, JailedSubject};
use watchtower_directory::{Directory, DirectoryEvent, SubjectKind};
use watchtower_gateway::{
    route_frame, ChainEvent, EventSubscription, RestClient, SubscriptionFilter,
};
use watchtower_pipeline::{
    BlockObservationHandler, BlockPipeline, BlockPipelineConfig, CheckpointObservationHandler,
    CheckpointPipeline, EpochTracker,
};
use watchtower_types::{
    BlsStatsRepository, FinalityProviderStatsRepository, IdentityRepository, MemoryStore, Network,
    NotificationSink, Subsystem, SystemClock, ValidatorStatsRepository,
};

/// Interval between directory refreshes.
const DIRECTORY_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// Capacity of the routed block channel.
const BLOCK_CHANNEL_CAPACITY: usize = 1024;

/// Capacity of the routed sealed-epoch channel.
const EPOCH_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the jailed-transition channel.
const DIRECTORY_EVENT_CAPACITY: usize = 64;

/// Grace period for task teardown on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Repository handles, one per record family.
#[derive(Clone)]
pub struct Stores {
    /// Validator block-signature stats.
    pub validator_stats: Arc<dyn ValidatorStatsRepository>,
    /// Finality-provider vote stats.
    pub provider_stats: Arc<dyn FinalityProviderStatsRepository>,
    /// BLS checkpoint stats.
    pub bls_stats: Arc<dyn BlsStatsRepository>,
    /// Identity records.
    pub identities: Arc<dyn IdentityRepository>,
}

impl Stores {
    /// All families backed by one shared in-memory store.
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            validator_stats: store.clone(),
            provider_stats: store.clone(),
            bls_stats: store.clone(),
            identities: store,
        }
    }
}

/// One network's supervisor: owns every subsystem and their lifecycles.
pub struct Orchestrator {
    network: Network,
    rest: Arc<RestClient>,
    events: Arc<EventSubscription>,
    directory: Arc<Directory>,
    directory_events_rx: Mutex<Option<mpsc::Receiver<DirectoryEvent>>>,
    governor: Arc<AlertGovernor>,
    epoch_tracker: Arc<EpochTracker>,
    block_pipeline: Arc<BlockPipeline>,
    checkpoint_pipeline: Arc<CheckpointPipeline>,
    subsystems: Vec<Arc<dyn Subsystem>>,
    stores: Stores,
    fp_monitoring: bool,
    monitoring_interval_ms: u64,
}

impl Orchestrator {
    /// Build the full wiring for one network. No I/O happens here.
    pub fn build(
        config: &AppConfig,
        net: &NetworkConfig,
        stores: Stores,
        sink: Arc<dyn NotificationSink>,
    ) -> RuntimeResult<Self> {
        let network = net.network;
        let rest = Arc::new(RestClient::new(net.rpc_urls.clone()).map_err(crate::RuntimeError::Bootstrap)?);

        let (directory_events_tx, directory_events_rx) = mpsc::channel(DIRECTORY_EVENT_CAPACITY);
        let directory = Arc::new(Directory::new(
            network,
            rest.clone(),
            stores.identities.clone(),
            directory_events_tx,
            DIRECTORY_REFRESH_INTERVAL,
        ));

        let clock = Arc::new(SystemClock);
        let governor = Arc::new(AlertGovernor::new(
            network,
            config.policy.clone(),
            sink,
            clock.clone(),
        ));

        let validator_agg = Arc::new(ValidatorSignatureAggregator::new(
            network,
            ValidatorAggregatorConfig {
                enabled: config.validator_monitoring,
                ..ValidatorAggregatorConfig::default()
            },
            directory.clone(),
            stores.validator_stats.clone(),
            governor.clone(),
        ));
        let provider_agg = Arc::new(FinalityProviderAggregator::new(
            network,
            ProviderAggregatorConfig {
                enabled: config.fp_monitoring,
                ..ProviderAggregatorConfig::default()
            },
            directory.clone(),
            stores.provider_stats.clone(),
            governor.clone(),
        ));
        let bls_agg = Arc::new(BlsCheckpointAggregator::new(
            network,
            BlsAggregatorConfig {
                enabled: config.bls_monitoring,
            },
            stores.bls_stats.clone(),
            governor.clone(),
            clock,
        ));

        let epoch_tracker = Arc::new(EpochTracker::new());
        let block_handlers: Vec<Arc<dyn BlockObservationHandler>> =
            vec![validator_agg.clone(), provider_agg.clone()];
        let block_pipeline = Arc::new(BlockPipeline::new(
            network,
            BlockPipelineConfig {
                finality_lag: config.finality_lag,
                fetch_fp_votes: config.fp_monitoring,
                ..BlockPipelineConfig::default()
            },
            rest.clone(),
            epoch_tracker.clone(),
            block_handlers,
        ));

        let checkpoint_handlers: Vec<Arc<dyn CheckpointObservationHandler>> =
            vec![bls_agg.clone()];
        let checkpoint_pipeline = Arc::new(CheckpointPipeline::new(
            network,
            rest.clone(),
            directory.clone(),
            epoch_tracker.clone(),
            checkpoint_handlers,
        ));

        let events = Arc::new(
            EventSubscription::new(
                net.ws_urls.clone(),
                vec![
                    SubscriptionFilter::new_block(),
                    SubscriptionFilter::checkpoint_sealed(),
                ],
            )
            .map_err(crate::RuntimeError::Bootstrap)?,
        );

        let subsystems: Vec<Arc<dyn Subsystem>> = vec![validator_agg, provider_agg, bls_agg];

        Ok(Self {
            network,
            rest,
            events,
            directory,
            directory_events_rx: Mutex::new(Some(directory_events_rx)),
            governor,
            epoch_tracker,
            block_pipeline,
            checkpoint_pipeline,
            subsystems,
            stores,
            fp_monitoring: config.fp_monitoring,
            monitoring_interval_ms: config.monitoring_interval_ms,
        })
    }

    /// Run until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> RuntimeResult<()> {
        self.rest.check_health().await?;
        info!(network = %self.network, endpoints = self.rest.endpoint_count(), "node reachable");

        for subsystem in &self.subsystems {
            if subsystem.is_enabled() {
                if let Err(e) = subsystem.start().await {
                    warn!(network = %self.network, error = %e, "subsystem failed to start");
                }
            } else {
                info!(network = %self.network, name = subsystem.name(), "subsystem disabled");
            }
        }

        if let Err(e) = self.directory.refresh().await {
            warn!(network = %self.network, error = %e, "initial directory refresh failed");
        }
        if let Err(e) = self.epoch_tracker.refresh(&self.rest).await {
            debug!(network = %self.network, error = %e, "initial epoch refresh failed");
        }

        let last_stored = self.last_stored_height().await;
        if let Err(e) = self.block_pipeline.catch_up(last_stored).await {
            warn!(network = %self.network, error = %e, "gap catch-up failed, stream will recover");
        }

        let (blocks_tx, blocks_rx) = mpsc::channel(BLOCK_CHANNEL_CAPACITY);
        let (epochs_tx, epochs_rx) = mpsc::channel(EPOCH_CHANNEL_CAPACITY);

        let mut tasks = JoinSet::new();

        let events = self.events.clone();
        let events_shutdown = shutdown.clone();
        tasks.spawn(async move {
            events.run(events_shutdown).await;
        });

        let mut frames_rx = self.events.subscribe();
        let network = self.network;
        let mut router_shutdown = shutdown.clone();
        tasks.spawn(async move {
            loop {
                tokio::select! {
                    frame = frames_rx.recv() => {
                        match frame {
                            Ok(frame) => match route_frame(&frame) {
                                Some(ChainEvent::NewBlock(block)) => {
                                    if blocks_tx.send(block).await.is_err() {
                                        return;
                                    }
                                }
                                Some(ChainEvent::CheckpointSealed { epoch }) => {
                                    if epochs_tx.send(epoch).await.is_err() {
                                        return;
                                    }
                                }
                                None => {}
                            },
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(network = %network, skipped, "router lagging, oldest events dropped");
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                        }
                    }
                    _ = router_shutdown.changed() => {
                        if *router_shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });

        let block_pipeline = self.block_pipeline.clone();
        let block_shutdown = shutdown.clone();
        tasks.spawn(async move {
            block_pipeline.run(blocks_rx, block_shutdown).await;
        });

        let checkpoint_pipeline = self.checkpoint_pipeline.clone();
        let checkpoint_shutdown = shutdown.clone();
        tasks.spawn(async move {
            checkpoint_pipeline.run(epochs_rx, checkpoint_shutdown).await;
        });

        let directory = self.directory.clone();
        let refresh_shutdown = shutdown.clone();
        tasks.spawn(async move {
            directory.run_refresh_loop(refresh_shutdown).await;
        });

        // Stamp the active finality-provider set on the monitoring timer,
        // against the last height the pipeline fully processed.
        if self.fp_monitoring {
            let directory = self.directory.clone();
            let block_pipeline = self.block_pipeline.clone();
            let network = self.network;
            let mut active_shutdown = shutdown.clone();
            let mut timer =
                tokio::time::interval(Duration::from_millis(self.monitoring_interval_ms.max(1)));
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tasks.spawn(async move {
                loop {
                    tokio::select! {
                        _ = timer.tick() => {
                            let height = block_pipeline.watermark();
                            if height == 0 {
                                continue;
                            }
                            match directory.active_finality_providers(height).await {
                                Ok(active) => {
                                    debug!(network = %network, height, active = active.len(), "active set stamped");
                                }
                                Err(e) => {
                                    warn!(network = %network, height, error = %e, "active set fetch failed");
                                }
                            }
                        }
                        _ = active_shutdown.changed() => {
                            if *active_shutdown.borrow() {
                                return;
                            }
                        }
                    }
                }
            });
        }

        if let Some(mut directory_events_rx) = self.directory_events_rx.lock().take() {
            let governor = self.governor.clone();
            let mut jailed_shutdown = shutdown.clone();
            tasks.spawn(async move {
                loop {
                    tokio::select! {
                        event = directory_events_rx.recv() => {
                            match event {
                                Some(event) => {
                                    governor
                                        .handle_jailed_transition(jailed_subject(event))
                                        .await;
                                }
                                None => return,
                            }
                        }
                        _ = jailed_shutdown.changed() => {
                            if *jailed_shutdown.borrow() {
                                return;
                            }
                        }
                    }
                }
            });
        }

        info!(network = %self.network, "orchestrator running");
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        info!(network = %self.network, "orchestrator stopping");
        for subsystem in self.subsystems.iter().rev() {
            if subsystem.is_enabled() {
                if let Err(e) = subsystem.stop().await {
                    warn!(network = %self.network, error = %e, "subsystem failed to stop");
                }
            }
        }

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(network = %self.network, "grace period elapsed, abandoning tasks");
            tasks.abort_all();
        }
        info!(network = %self.network, "orchestrator stopped");
        Ok(())
    }

    /// Highest height any stats family has seen, for catch-up.
    async fn last_stored_height(&self) -> Option<u64> {
        let from_validators = self
            .stores
            .validator_stats
            .latest_height(self.network)
            .await
            .unwrap_or_default();
        let from_providers = self
            .stores
            .provider_stats
            .latest_height(self.network)
            .await
            .unwrap_or_default();
        from_validators.max(from_providers)
    }
}

fn jailed_subject(event: DirectoryEvent) -> JailedSubject {
    JailedSubject {
        key: event.key,
        moniker: event.moniker,
        is_validator: event.kind == SubjectKind::Validator,
        jailed: event.jailed,
    }
}
