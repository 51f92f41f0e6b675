//! Current-epoch tracking shared by the two pipelines.

use crate::error::PipelineResult;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use watchtower_gateway::chaindata::CurrentEpochResponse;
use watchtower_gateway::RestClient;

/// Fixed epoch length in blocks, used when the node reports no boundary.
pub const EPOCH_BLOCKS: u64 = 360;

/// Tracks the chain's current epoch and its reported boundary.
///
/// The block pipeline refreshes the tracker on a height stride so the
/// checkpoint pipeline always works against a recent current-epoch value.
#[derive(Debug, Default)]
pub struct EpochTracker {
    current_epoch: AtomicU64,
    epoch_boundary: AtomicU64,
}

impl EpochTracker {
    /// Create a tracker with no epoch observed yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-read the current epoch from the epoching endpoint.
    pub async fn refresh(&self, rest: &RestClient) -> PipelineResult<u64> {
        let response: CurrentEpochResponse =
            rest.get("/babylon/epoching/v1/current_epoch", &[]).await?;
        self.current_epoch
            .store(response.current_epoch, Ordering::Relaxed);
        self.epoch_boundary
            .store(response.epoch_boundary.unwrap_or(0), Ordering::Relaxed);
        debug!(
            epoch = response.current_epoch,
            boundary = ?response.epoch_boundary,
            "current epoch refreshed"
        );
        Ok(response.current_epoch)
    }

    /// Last observed current epoch, 0 before the first refresh.
    pub fn current_epoch(&self) -> u64 {
        self.current_epoch.load(Ordering::Relaxed)
    }

    /// First height of an epoch.
    ///
    /// For the current epoch the node-reported boundary (last height of
    /// the epoch) is used when present; every other case falls back to
    /// the fixed epoch length.
    pub fn epoch_first_height(&self, epoch: u64) -> u64 {
        let boundary = self.epoch_boundary.load(Ordering::Relaxed);
        if boundary > 0 && epoch == self.current_epoch() && boundary >= EPOCH_BLOCKS {
            return boundary - EPOCH_BLOCKS + 1;
        }
        epoch * EPOCH_BLOCKS + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_height_from_constant() {
        let tracker = EpochTracker::new();
        assert_eq!(tracker.epoch_first_height(0), 1);
        assert_eq!(tracker.epoch_first_height(5), 1801);
    }

    #[test]
    fn test_first_height_prefers_reported_boundary() {
        let tracker = EpochTracker::new();
        tracker.current_epoch.store(5, Ordering::Relaxed);
        tracker.epoch_boundary.store(2160, Ordering::Relaxed);

        // Current epoch: derived from the boundary.
        assert_eq!(tracker.epoch_first_height(5), 1801);
        // Other epochs: constant arithmetic.
        assert_eq!(tracker.epoch_first_height(4), 1441);
    }
}
