//! Observations produced by the block and checkpoint pipelines.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single processed block, reduced to what the aggregators need.
///
/// `signers` holds consensus hex addresses of validators whose commit
/// signature was present; `fp_signers` holds BTC public keys of finality
/// providers that voted on the height. Unknown signers stay in the sets and
/// count toward aggregate totals without producing per-subject stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockObservation {
    /// Block height.
    pub height: u64,
    /// Block timestamp in unix milliseconds.
    pub timestamp: u64,
    /// Commit round the block was decided in.
    pub round: u32,
    /// Consensus hex addresses that signed the commit.
    pub signers: HashSet<String>,
    /// BTC public keys that cast a finality vote for this height;
    /// `None` when the vote set could not be fetched for the height.
    pub fp_signers: Option<HashSet<String>>,
}

/// One validator's entry in an epoch checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointVote {
    /// Validator address as carried in the checkpoint vote.
    pub address: String,
    /// Resolved display name, or `"Unknown"` when the directory misses.
    pub moniker: String,
    /// Voting power of the validator at the checkpointed epoch.
    pub power: u64,
    /// Whether the BLS extension signature was present and committed.
    pub signed: bool,
}

/// The BLS vote set extracted from an injected epoch checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointObservation {
    /// Epoch number read from the embedded checkpoint, authoritative.
    pub epoch: u64,
    /// One entry per validator in the extended commit.
    pub votes: Vec<CheckpointVote>,
}

impl CheckpointObservation {
    /// Total voting power across all votes.
    pub fn total_power(&self) -> u64 {
        self.votes.iter().map(|v| v.power).sum()
    }

    /// Voting power behind present signatures.
    pub fn signed_power(&self) -> u64 {
        self.votes.iter().filter(|v| v.signed).map(|v| v.power).sum()
    }

    /// Number of validators that signed.
    pub fn signed_count(&self) -> usize {
        self.votes.iter().filter(|v| v.signed).count()
    }
}
