//! Persisted participation statistics, one record family per signer role.

use crate::network::Network;
use serde::{Deserialize, Serialize};

/// One entry of the bounded recent-block history, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentBlock {
    /// Block height.
    pub height: u64,
    /// Whether the subject signed the commit at this height.
    pub signed: bool,
    /// Commit round of the block.
    pub round: u32,
    /// Block timestamp in unix milliseconds.
    pub timestamp: u64,
}

/// Sliding-window block-signature statistics for one validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSignatureStats {
    /// Consensus hex address the stats are keyed by.
    pub subject_key: String,
    /// Network the blocks were observed on.
    pub network: Network,
    /// Resolved display name at the time of the last update.
    pub moniker: String,
    /// Signed blocks counted inside the window.
    pub total_signed_blocks: u64,
    /// Blocks counted inside the window, capped at the window size.
    pub total_blocks_in_window: u64,
    /// Percentage of signed blocks in the window, 0 when the window is empty.
    pub signature_rate: f64,
    /// Current run of consecutively signed blocks.
    pub consecutive_signed: u64,
    /// Current run of consecutively missed blocks.
    pub consecutive_missed: u64,
    /// Bounded history of the most recent blocks, newest first.
    pub recent_blocks: Vec<RecentBlock>,
    /// Unix milliseconds of the most recent update, non-decreasing.
    pub last_updated: u64,
}

impl ValidatorSignatureStats {
    /// Empty stats for a subject that has not been observed yet.
    pub fn empty(subject_key: impl Into<String>, network: Network) -> Self {
        Self {
            subject_key: subject_key.into(),
            network,
            moniker: String::new(),
            total_signed_blocks: 0,
            total_blocks_in_window: 0,
            signature_rate: 0.0,
            consecutive_signed: 0,
            consecutive_missed: 0,
            recent_blocks: Vec::new(),
            last_updated: 0,
        }
    }

    /// Recompute the rate from the current counters.
    pub fn recompute_rate(&mut self) {
        self.signature_rate = if self.total_blocks_in_window > 0 {
            100.0 * self.total_signed_blocks as f64 / self.total_blocks_in_window as f64
        } else {
            0.0
        };
    }
}

/// Per-provider finality-vote statistics over the observed height range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalityProviderStats {
    /// BTC public key hex the stats are keyed by.
    pub btc_pk_hex: String,
    /// Network the votes were observed on.
    pub network: Network,
    /// Resolved display name at the time of the last update.
    pub moniker: String,
    /// First height the provider was observed at.
    pub start_height: u64,
    /// Most recent height the provider was observed at.
    pub end_height: u64,
    /// Total observed blocks, equals `signed_blocks + missed_blocks`.
    pub total_blocks: u64,
    /// Blocks the provider voted on.
    pub signed_blocks: u64,
    /// Blocks the provider missed.
    pub missed_blocks: u64,
    /// Percentage of signed blocks over the whole observed range.
    pub signature_rate: f64,
    /// Bounded list of missed heights, newest retained.
    pub missed_block_heights: Vec<u64>,
    /// Jailed flag copied from the directory at the last update.
    pub jailed: bool,
    /// Active-set flag copied from the directory at the last update.
    pub is_active: bool,
    /// Unix milliseconds of the most recent update, non-decreasing.
    pub last_updated: u64,
}

impl FinalityProviderStats {
    /// Recompute the rate from the current counters.
    pub fn recompute_rate(&mut self) {
        self.signature_rate = if self.total_blocks > 0 {
            100.0 * self.signed_blocks as f64 / self.total_blocks as f64
        } else {
            0.0
        };
    }
}

/// Aggregate BLS participation for one checkpointed epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlsCheckpointStats {
    /// Checkpointed epoch number.
    pub epoch: u64,
    /// Network the checkpoint was observed on.
    pub network: Network,
    /// Number of validators in the extended commit.
    pub total_validators: u64,
    /// Total voting power across the commit.
    pub total_power: u64,
    /// Voting power behind present signatures.
    pub signed_power: u64,
    /// `total_power - signed_power`.
    pub unsigned_power: u64,
    /// Share of validators that signed, rendered as `"50.00%"`.
    pub participation_rate_by_count: String,
    /// Share of power that signed, rendered as `"37.50%"`.
    pub participation_rate_by_power: String,
    /// Unix milliseconds the checkpoint was processed at.
    pub timestamp: u64,
}

/// Render a percentage the way checkpoint records carry it.
pub fn format_rate(pct: f64) -> String {
    format!("{:.2}%", pct)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stats_rate_is_zero() {
        let mut stats = ValidatorSignatureStats::empty("AA", Network::Mainnet);
        stats.recompute_rate();
        assert_eq!(stats.signature_rate, 0.0);
    }

    #[test]
    fn test_recompute_rate() {
        let mut stats = ValidatorSignatureStats::empty("AA", Network::Mainnet);
        stats.total_signed_blocks = 200;
        stats.total_blocks_in_window = 250;
        stats.recompute_rate();
        assert_eq!(stats.signature_rate, 80.0);
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(37.5), "37.50%");
        assert_eq!(format_rate(100.0), "100.00%");
        assert_eq!(format_rate(0.0), "0.00%");
    }

    #[test]
    fn test_stats_serde_roundtrip() {
        let mut stats = ValidatorSignatureStats::empty("AA", Network::Testnet);
        stats.recent_blocks.push(RecentBlock {
            height: 10,
            signed: true,
            round: 0,
            timestamp: 1,
        });
        let json = serde_json::to_string(&stats).unwrap();
        let back: ValidatorSignatureStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }

    #[test]
    fn test_provider_stats_serde_roundtrip() {
        let mut stats = FinalityProviderStats {
            btc_pk_hex: "pk".to_string(),
            network: Network::Mainnet,
            moniker: "fp".to_string(),
            start_height: 10,
            end_height: 20,
            total_blocks: 11,
            signed_blocks: 9,
            missed_blocks: 2,
            signature_rate: 0.0,
            missed_block_heights: vec![12, 17],
            jailed: false,
            is_active: true,
            last_updated: 20_000,
        };
        stats.recompute_rate();
        let json = serde_json::to_string(&stats).unwrap();
        let back: FinalityProviderStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }

    #[test]
    fn test_bls_stats_serde_roundtrip() {
        let stats = BlsCheckpointStats {
            epoch: 5,
            network: Network::Mainnet,
            total_validators: 4,
            total_power: 400,
            signed_power: 150,
            unsigned_power: 250,
            participation_rate_by_count: format_rate(50.0),
            participation_rate_by_power: format_rate(37.5),
            timestamp: 0,
        };
        let json = serde_json::to_string(&stats).unwrap();
        let back: BlsCheckpointStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
