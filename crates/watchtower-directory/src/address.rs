//! Consensus address derivation from a validator's consensus public key.

use crate::error::{DirectoryError, DirectoryResult};
use base64::Engine;
use bech32::{Bech32, Hrp};
use sha2::{Digest, Sha256};

/// Length of a tendermint consensus address in bytes.
const CONSENSUS_ADDRESS_LEN: usize = 20;

/// Derive the bech32 consensus address and its uppercase hex form.
///
/// The address is the SHA-256 digest of the raw consensus key, truncated
/// to 20 bytes, bech32-encoded under the network's `valcons` prefix.
pub fn derive_consensus_addresses(
    consensus_pubkey_b64: &str,
    prefix: &str,
) -> DirectoryResult<(String, String)> {
    let key_bytes = base64::engine::general_purpose::STANDARD
        .decode(consensus_pubkey_b64)
        .map_err(|e| DirectoryError::BadConsensusKey {
            subject: consensus_pubkey_b64.to_string(),
            reason: format!("base64: {e}"),
        })?;

    let digest = Sha256::digest(&key_bytes);
    let address = &digest[..CONSENSUS_ADDRESS_LEN];

    let hrp = Hrp::parse(prefix).map_err(|e| DirectoryError::BadConsensusKey {
        subject: consensus_pubkey_b64.to_string(),
        reason: format!("prefix: {e}"),
    })?;
    let bech = bech32::encode::<Bech32>(hrp, address).map_err(|e| {
        DirectoryError::BadConsensusKey {
            subject: consensus_pubkey_b64.to_string(),
            reason: format!("bech32: {e}"),
        }
    })?;

    Ok((bech, hex::encode_upper(address)))
}
