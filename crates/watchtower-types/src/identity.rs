//! Identity records for the two monitored signer populations.

use crate::network::Network;
use serde::{Deserialize, Serialize};

/// A consensus validator, addressable by any of its three key forms.
///
/// All three keys resolve to the same record in the directory: the operator
/// bech32 address, the consensus bech32 address, and the uppercase hex form
/// of the consensus address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorIdentity {
    /// Operator address (`bbnvaloper...`).
    pub operator_address: String,
    /// Consensus address (`bbnvalcons...`), derived from the consensus key.
    pub consensus_address: String,
    /// Uppercase hex form of the 20-byte consensus address.
    pub consensus_hex: String,
    /// Base64 consensus public key as reported by the staking endpoint.
    pub consensus_pubkey: String,
    /// Human-readable display name.
    pub moniker: String,
    /// Whether the validator is currently jailed.
    pub jailed: bool,
    /// Whether the validator is bonded into the active set.
    pub bonded: bool,
    /// Network the validator belongs to.
    pub network: Network,
}

impl ValidatorIdentity {
    /// Every key form under which this record can be looked up.
    pub fn all_keys(&self) -> [&str; 4] {
        [
            &self.operator_address,
            &self.consensus_address,
            &self.consensus_hex,
            &self.consensus_pubkey,
        ]
    }
}

/// A BTC-staking finality provider, keyed by its BTC public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalityProviderIdentity {
    /// Hex-encoded BTC public key; the canonical lookup key.
    pub btc_pk_hex: String,
    /// Babylon owner address of the provider.
    pub owner_address: String,
    /// Human-readable display name.
    pub moniker: String,
    /// Whether the provider is currently jailed.
    pub jailed: bool,
    /// Whether the provider is in the active set at the latest observed height.
    pub is_active: bool,
    /// Network the provider belongs to.
    pub network: Network,
}
