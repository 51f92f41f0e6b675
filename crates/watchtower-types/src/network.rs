//! Network identifiers for the monitored chains.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A monitored Babylon network.
///
/// Two orchestrators run side by side, one per network; every persisted
/// record is tagged with the network it was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Babylon mainnet.
    Mainnet,
    /// Babylon testnet.
    Testnet,
}

impl Network {
    /// Stable lowercase name used in logs, record keys, and alert metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
        }
    }

    /// Bech32 prefix for consensus addresses on this network.
    pub fn valcons_prefix(&self) -> &'static str {
        "bbnvalcons"
    }

    /// All monitored networks.
    pub fn all() -> [Network; 2] {
        [Self::Mainnet, Self::Testnet]
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
