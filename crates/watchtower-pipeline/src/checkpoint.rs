//! Per-epoch extraction of the BLS vote set from injected checkpoints.

use crate::epoch::EpochTracker;
use crate::error::{PipelineError, PipelineResult};
use crate::ports::CheckpointObservationHandler;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use watchtower_directory::Directory;
use watchtower_gateway::chaindata::{is_injected_checkpoint, BlockTxsResponse, InjectedCheckpoint};
use watchtower_gateway::RestClient;
use watchtower_types::{CheckpointObservation, CheckpointVote, Network, UNKNOWN_MONIKER};

/// Heights scanned past the epoch's first height for the injected checkpoint.
const CHECKPOINT_OFFSET_SCAN: u64 = 5;

/// The checkpoint pipeline for one network.
///
/// Every sealed-checkpoint event triggers a scan of the first few heights
/// of the epoch for the transaction carrying the injected checkpoint
/// message. Each epoch is processed at most once per process lifetime; an
/// epoch whose checkpoint was not found stays unmarked and will only be
/// retried when a fresh event arrives.
pub struct CheckpointPipeline {
    network: Network,
    rest: Arc<RestClient>,
    directory: Arc<Directory>,
    epoch_tracker: Arc<EpochTracker>,
    handlers: Vec<Arc<dyn CheckpointObservationHandler>>,
    processed: Mutex<HashSet<u64>>,
}

impl CheckpointPipeline {
    /// Create a pipeline with no processed epochs.
    pub fn new(
        network: Network,
        rest: Arc<RestClient>,
        directory: Arc<Directory>,
        epoch_tracker: Arc<EpochTracker>,
        handlers: Vec<Arc<dyn CheckpointObservationHandler>>,
    ) -> Self {
        Self {
            network,
            rest,
            directory,
            epoch_tracker,
            handlers,
            processed: Mutex::new(HashSet::new()),
        }
    }

    /// Whether an epoch has already produced an observation.
    pub fn is_processed(&self, epoch: u64) -> bool {
        self.processed.lock().contains(&epoch)
    }

    /// Consume routed sealed-checkpoint epochs until shutdown.
    pub async fn run(
        &self,
        mut epochs_rx: mpsc::Receiver<u64>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                epoch = epochs_rx.recv() => {
                    match epoch {
                        Some(epoch) => {
                            if let Err(e) = self.handle_sealed(epoch).await {
                                warn!(network = %self.network, epoch, error = %e, "checkpoint processing failed");
                            }
                        }
                        None => return,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Locate and process the injected checkpoint for a sealed epoch.
    pub async fn handle_sealed(&self, epoch: u64) -> PipelineResult<()> {
        if self.is_processed(epoch) {
            debug!(network = %self.network, epoch, "epoch already processed");
            return Ok(());
        }

        let start = self.epoch_tracker.epoch_first_height(epoch);
        for offset in 0..CHECKPOINT_OFFSET_SCAN {
            let height = start + offset;
            let path = format!("/cosmos/tx/v1beta1/txs/block/{height}");
            let txs = match self.rest.get::<BlockTxsResponse>(&path, &[]).await {
                Ok(txs) => txs,
                Err(e) => {
                    debug!(network = %self.network, height, error = %e, "tx fetch failed, next offset");
                    continue;
                }
            };
            if let Some(checkpoint) = find_checkpoint(&txs) {
                debug!(network = %self.network, epoch, height, offset, "injected checkpoint found");
                self.process_checkpoint(epoch, checkpoint).await;
                return Ok(());
            }
        }

        Err(PipelineError::CheckpointNotFound {
            epoch,
            start,
            scanned: CHECKPOINT_OFFSET_SCAN,
        })
    }

    /// Turn a decoded checkpoint into an observation and dispatch it.
    ///
    /// The epoch embedded in the checkpoint is authoritative; the event's
    /// epoch only serves as a fallback for old encodings without one.
    pub async fn process_checkpoint(&self, event_epoch: u64, checkpoint: InjectedCheckpoint) {
        let epoch = checkpoint.epoch_num().unwrap_or(event_epoch);
        let raw_votes = checkpoint
            .extended_commit_info
            .map(|info| info.votes)
            .unwrap_or_default();

        let mut votes = Vec::with_capacity(raw_votes.len());
        for vote in &raw_votes {
            // The vote's address string is the lookup key as carried on the
            // wire; hash-derived forms that the directory cannot resolve
            // stay in the set under the unknown label.
            let moniker = self
                .directory
                .lookup_by_any_key(&vote.validator.address)
                .await
                .map(|v| v.moniker)
                .unwrap_or_else(|| UNKNOWN_MONIKER.to_string());
            votes.push(CheckpointVote {
                address: vote.validator.address.clone(),
                moniker,
                power: vote.validator.power,
                signed: vote.is_signed(),
            });
        }

        let observation = CheckpointObservation { epoch, votes };
        for handler in &self.handlers {
            handler.handle_checkpoint(&observation).await;
        }
        self.processed.lock().insert(epoch);
        if epoch != event_epoch {
            self.processed.lock().insert(event_epoch);
        }

        info!(
            network = %self.network,
            epoch,
            validators = observation.votes.len(),
            signed = observation.signed_count(),
            "checkpoint processed"
        );
    }
}

/// First message across the height's transactions that is an injected
/// checkpoint with its extended commit present.
fn find_checkpoint(txs: &BlockTxsResponse) -> Option<InjectedCheckpoint> {
    for tx in &txs.txs {
        for message in &tx.body.messages {
            if !is_injected_checkpoint(message) {
                continue;
            }
            match serde_json::from_value::<InjectedCheckpoint>(message.clone()) {
                Ok(checkpoint) if checkpoint.extended_commit_info.is_some() => {
                    return Some(checkpoint);
                }
                Ok(_) => {
                    debug!("injected checkpoint without extended commit, skipped");
                }
                Err(e) => {
                    debug!(error = %e, "injected checkpoint failed to decode, skipped");
                }
            }
        }
    }
    None
}
