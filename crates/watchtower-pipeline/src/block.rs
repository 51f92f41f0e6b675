//! Ordered per-height block processing with finality lag and gap catch-up.

use crate::epoch::EpochTracker;
use crate::error::PipelineResult;
use crate::ports::BlockObservationHandler;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use watchtower_gateway::chaindata::{Block, BlockResponse, VotesResponse};
use watchtower_gateway::RestClient;
use watchtower_types::{BlockObservation, Network};

/// Capacity of the per-height finality-vote cache.
const FP_VOTE_CACHE_CAP: usize = 256;

/// Block pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct BlockPipelineConfig {
    /// Heights the pipeline trails behind the highest seen height.
    pub finality_lag: u64,
    /// Maximum heights processed by one catch-up invocation.
    pub max_sync_blocks: u64,
    /// Refresh the current epoch every this many processed heights; 0 disables.
    pub epoch_refresh_stride: u64,
    /// Whether to fetch per-height finality votes.
    pub fetch_fp_votes: bool,
    /// Capacity of the processed-heights cache.
    pub processed_cache_cap: usize,
}

impl Default for BlockPipelineConfig {
    fn default() -> Self {
        Self {
            finality_lag: 3,
            max_sync_blocks: 100,
            epoch_refresh_stride: 50,
            fetch_fp_votes: true,
            processed_cache_cap: 10_000,
        }
    }
}

impl BlockPipelineConfig {
    /// Config for tests: no chain access on the processing path.
    pub fn for_testing() -> Self {
        Self {
            finality_lag: 3,
            max_sync_blocks: 100,
            epoch_refresh_stride: 0,
            fetch_fp_votes: false,
            processed_cache_cap: 64,
        }
    }
}

/// Bounded set of already-processed heights.
///
/// When full, the oldest half is evicted in one sweep.
#[derive(Debug)]
struct ProcessedCache {
    set: HashSet<u64>,
    order: VecDeque<u64>,
    cap: usize,
}

impl ProcessedCache {
    fn new(cap: usize) -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
            cap: cap.max(2),
        }
    }

    fn contains(&self, height: u64) -> bool {
        self.set.contains(&height)
    }

    fn insert(&mut self, height: u64) {
        if !self.set.insert(height) {
            return;
        }
        self.order.push_back(height);
        if self.order.len() >= self.cap {
            for _ in 0..self.cap / 2 {
                if let Some(evicted) = self.order.pop_front() {
                    self.set.remove(&evicted);
                }
            }
        }
    }
}

#[derive(Debug)]
struct PendingBlock {
    timestamp: u64,
    round: u32,
    signers: HashSet<String>,
}

#[derive(Debug)]
struct PipelineState {
    pending: BTreeMap<u64, PendingBlock>,
    watermark: u64,
    max_seen: u64,
    processed: ProcessedCache,
}

/// The ordered block pipeline for one network.
///
/// Heights are processed exactly once per process lifetime, in strictly
/// ascending order, and only once they sit at least `finality_lag` below
/// the highest height seen. The processing step is guarded by a
/// single-worker discipline: a re-entrant drain returns immediately.
pub struct BlockPipeline {
    network: Network,
    config: BlockPipelineConfig,
    rest: Arc<RestClient>,
    epoch_tracker: Arc<EpochTracker>,
    handlers: Vec<Arc<dyn BlockObservationHandler>>,
    state: Mutex<PipelineState>,
    worker: tokio::sync::Mutex<()>,
    fp_vote_cache: Mutex<LruCache<u64, HashSet<String>>>,
}

impl BlockPipeline {
    /// Create a pipeline with an empty queue and watermark 0.
    pub fn new(
        network: Network,
        config: BlockPipelineConfig,
        rest: Arc<RestClient>,
        epoch_tracker: Arc<EpochTracker>,
        handlers: Vec<Arc<dyn BlockObservationHandler>>,
    ) -> Self {
        let processed = ProcessedCache::new(config.processed_cache_cap);
        let cache_cap = NonZeroUsize::new(FP_VOTE_CACHE_CAP).unwrap_or(NonZeroUsize::MIN);
        Self {
            network,
            config,
            rest,
            epoch_tracker,
            handlers,
            state: Mutex::new(PipelineState {
                pending: BTreeMap::new(),
                watermark: 0,
                max_seen: 0,
                processed,
            }),
            worker: tokio::sync::Mutex::new(()),
            fp_vote_cache: Mutex::new(LruCache::new(cache_cap)),
        }
    }

    /// Last processed height.
    pub fn watermark(&self) -> u64 {
        self.state.lock().watermark
    }

    /// Consume routed block events until shutdown.
    pub async fn run(
        &self,
        mut blocks_rx: mpsc::Receiver<Block>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                block = blocks_rx.recv() => {
                    match block {
                        Some(block) => self.ingest(block).await,
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

    /// Enqueue one block event and drain whatever became eligible.
    ///
    /// Duplicates and stale heights are dropped, but still advance the
    /// highest-seen height so eligibility keeps moving.
    pub async fn ingest(&self, block: Block) {
        let height = block.header.height;
        {
            let mut state = self.state.lock();
            state.max_seen = state.max_seen.max(height);
            if height <= state.watermark
                || state.processed.contains(height)
                || state.pending.contains_key(&height)
            {
                debug!(network = %self.network, height, "duplicate or stale block dropped");
            } else {
                let signers = block
                    .signer_addresses()
                    .map(str::to_string)
                    .collect::<HashSet<_>>();
                state.pending.insert(
                    height,
                    PendingBlock {
                        timestamp: block.timestamp_ms(),
                        round: block.last_commit.round,
                        signers,
                    },
                );
            }
        }
        self.drain().await;
    }

    /// Process every eligible pending height in ascending order.
    ///
    /// Re-entrant calls return immediately; one worker at a time.
    pub async fn drain(&self) {
        let Ok(_guard) = self.worker.try_lock() else {
            return;
        };
        loop {
            let next = {
                let mut state = self.state.lock();
                let eligible = state
                    .pending
                    .keys()
                    .next()
                    .copied()
                    .filter(|h| h + self.config.finality_lag <= state.max_seen);
                match eligible {
                    Some(height) => state.pending.remove(&height).map(|b| (height, b)),
                    None => None,
                }
            };
            let Some((height, pending)) = next else {
                return;
            };
            self.process_height(height, pending).await;
        }
    }

    /// Initial-sync catch-up over REST; returns the number of processed heights.
    ///
    /// The range starts right after the last stored height, floored so one
    /// invocation never processes more than `max_sync_blocks`; the runtime
    /// stream closes any remaining gap once online.
    pub async fn catch_up(&self, last_stored_height: Option<u64>) -> PipelineResult<u64> {
        let _guard = self.worker.lock().await;
        let current = self.rest.current_height().await?;
        {
            let mut state = self.state.lock();
            state.max_seen = state.max_seen.max(current);
        }

        let Some((start, end)) = sync_range(
            last_stored_height,
            current,
            self.config.finality_lag,
            self.config.max_sync_blocks,
        ) else {
            debug!(network = %self.network, current, "no catch-up needed");
            return Ok(0);
        };

        let mut processed = 0u64;
        for height in start..=end {
            let skip = {
                let state = self.state.lock();
                height <= state.watermark || state.processed.contains(height)
            };
            if skip {
                continue;
            }
            let path = format!("/cosmos/base/tendermint/v1beta1/blocks/{height}");
            let block = match self.rest.get::<BlockResponse>(&path, &[]).await {
                Ok(response) => response.block,
                Err(e) => {
                    warn!(network = %self.network, height, error = %e, "catch-up fetch failed");
                    continue;
                }
            };
            let signers = block
                .signer_addresses()
                .map(str::to_string)
                .collect::<HashSet<_>>();
            let pending = PendingBlock {
                timestamp: block.timestamp_ms(),
                round: block.last_commit.round,
                signers,
            };
            self.process_height(height, pending).await;
            processed += 1;
        }

        info!(
            network = %self.network,
            start,
            end,
            processed,
            "gap catch-up finished"
        );
        Ok(processed)
    }

    async fn process_height(&self, height: u64, pending: PendingBlock) {
        let fp_signers = if self.config.fetch_fp_votes {
            self.fp_votes(height).await
        } else {
            Some(HashSet::new())
        };

        let observation = BlockObservation {
            height,
            timestamp: pending.timestamp,
            round: pending.round,
            signers: pending.signers,
            fp_signers,
        };
        for handler in &self.handlers {
            handler.handle_block(&observation).await;
        }

        {
            let mut state = self.state.lock();
            state.watermark = state.watermark.max(height);
            state.processed.insert(height);
        }
        debug!(network = %self.network, height, "height processed");

        let stride = self.config.epoch_refresh_stride;
        if stride > 0 && height % stride == 0 {
            if let Err(e) = self.epoch_tracker.refresh(&self.rest).await {
                debug!(network = %self.network, error = %e, "epoch refresh failed");
            }
        }
    }

    /// Finality votes for one height, LRU-cached; `None` when unavailable.
    async fn fp_votes(&self, height: u64) -> Option<HashSet<String>> {
        if let Some(cached) = self.fp_vote_cache.lock().get(&height).cloned() {
            return Some(cached);
        }
        let path = format!("/babylon/finality/v1/votes/{height}");
        match self.rest.get::<VotesResponse>(&path, &[]).await {
            Ok(response) => {
                let votes: HashSet<String> = response.btc_pks.into_iter().collect();
                self.fp_vote_cache.lock().put(height, votes.clone());
                Some(votes)
            }
            Err(e) => {
                warn!(network = %self.network, height, error = %e, "finality votes unavailable");
                None
            }
        }
    }
}

/// Compute the inclusive catch-up range, or `None` when already caught up.
fn sync_range(
    last_stored: Option<u64>,
    current: u64,
    lag: u64,
    max_sync: u64,
) -> Option<(u64, u64)> {
    let end = current.saturating_sub(lag);
    let floor = current.saturating_sub(lag + max_sync);
    let start = match last_stored {
        Some(height) => (height + 1).max(floor),
        None => floor.max(1),
    };
    (start <= end && end > 0).then_some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct RecordingHandler {
        heights: Mutex<Vec<u64>>,
    }

    impl RecordingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                heights: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<u64> {
            self.heights.lock().clone()
        }
    }

    #[async_trait]
    impl BlockObservationHandler for RecordingHandler {
        async fn handle_block(&self, observation: &BlockObservation) {
            self.heights.lock().push(observation.height);
        }
    }

    fn make_block(height: u64) -> Block {
        serde_json::from_value(serde_json::json!({
            "header": {"height": height.to_string(), "time": "2024-01-01T00:00:00Z"},
            "last_commit": {
                "round": 0,
                "signatures": [{
                    "block_id_flag": "BLOCK_ID_FLAG_COMMIT",
                    "validator_address": "AA11",
                    "signature": "c2ln"
                }]
            }
        }))
        .unwrap()
    }

    fn make_pipeline(handler: Arc<RecordingHandler>) -> BlockPipeline {
        let rest = Arc::new(RestClient::new(vec!["http://127.0.0.1:1".to_string()]).unwrap());
        BlockPipeline::new(
            Network::Mainnet,
            BlockPipelineConfig::for_testing(),
            rest,
            Arc::new(EpochTracker::new()),
            vec![handler],
        )
    }

    #[test]
    fn test_processed_cache_half_eviction() {
        let mut cache = ProcessedCache::new(8);
        for height in 0..8u64 {
            cache.insert(height);
        }
        // The oldest half was swept out, the newest half survives.
        assert!(!cache.contains(0));
        assert!(!cache.contains(3));
        assert!(cache.contains(4));
        assert!(cache.contains(7));
    }

    #[test]
    fn test_sync_range_caps_at_max_sync() {
        // Stored 1000, tip 1100, lag 3: resume right after the store.
        assert_eq!(sync_range(Some(1000), 1100, 3, 100), Some((1001, 1097)));
        // Stored far behind: the floor wins and bounds the work.
        assert_eq!(sync_range(Some(10), 1100, 3, 100), Some((997, 1097)));
        // Nothing stored yet.
        assert_eq!(sync_range(None, 1100, 3, 100), Some((997, 1097)));
        // Already caught up.
        assert_eq!(sync_range(Some(1097), 1100, 3, 100), None);
        // Fresh chain shorter than the lag.
        assert_eq!(sync_range(None, 2, 3, 100), None);
    }

    #[tokio::test]
    async fn test_heights_process_in_ascending_order_behind_lag() {
        let handler = RecordingHandler::new();
        let pipeline = make_pipeline(handler.clone());

        // Deliver out of order; lag is 3, so max_seen 105 admits up to 102.
        for height in [103u64, 100, 105, 101, 102, 104] {
            pipeline.ingest(make_block(height)).await;
        }
        assert_eq!(handler.seen(), vec![100, 101, 102]);
        assert_eq!(pipeline.watermark(), 102);

        // A later height extends max_seen and releases the rest.
        pipeline.ingest(make_block(108)).await;
        assert_eq!(handler.seen(), vec![100, 101, 102, 103, 104, 105]);
        assert_eq!(pipeline.watermark(), 105);
    }

    #[tokio::test]
    async fn test_duplicates_and_stale_heights_drop() {
        let handler = RecordingHandler::new();
        let pipeline = make_pipeline(handler.clone());

        for height in [100u64, 101, 102, 103, 104, 105] {
            pipeline.ingest(make_block(height)).await;
        }
        let before = handler.seen();

        // Re-delivering processed and pending heights changes nothing.
        pipeline.ingest(make_block(100)).await;
        pipeline.ingest(make_block(104)).await;
        assert_eq!(handler.seen(), before);
    }

    #[tokio::test]
    async fn test_observation_carries_commit_signers() {
        let handler = RecordingHandler::new();
        let rest = Arc::new(RestClient::new(vec!["http://127.0.0.1:1".to_string()]).unwrap());

        struct SignerCheck {
            seen: Mutex<Vec<BlockObservation>>,
        }
        #[async_trait]
        impl BlockObservationHandler for SignerCheck {
            async fn handle_block(&self, observation: &BlockObservation) {
                self.seen.lock().push(observation.clone());
            }
        }
        let check = Arc::new(SignerCheck {
            seen: Mutex::new(Vec::new()),
        });
        let pipeline = BlockPipeline::new(
            Network::Mainnet,
            BlockPipelineConfig::for_testing(),
            rest,
            Arc::new(EpochTracker::new()),
            vec![handler, check.clone()],
        );

        for height in [10u64, 11, 12, 13] {
            pipeline.ingest(make_block(height)).await;
        }
        let seen = check.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].height, 10);
        assert!(seen[0].signers.contains("AA11"));
        assert!(seen[0].timestamp > 0);
    }
}
