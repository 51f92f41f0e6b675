//! Repository ports and the in-memory reference store.
//!
//! The production store is an external collaborator; subsystems only ever
//! see these traits. [`MemoryStore`] implements all of them and backs the
//! daemon when no store URI is configured, as well as every test.

use crate::errors::StoreError;
use crate::identity::{FinalityProviderIdentity, ValidatorIdentity};
use crate::network::Network;
use crate::stats::{BlsCheckpointStats, FinalityProviderStats, ValidatorSignatureStats};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Persistence for validator block-signature statistics.
#[async_trait]
pub trait ValidatorStatsRepository: Send + Sync {
    /// Insert or replace the record for `stats.subject_key`.
    async fn upsert(&self, stats: &ValidatorSignatureStats) -> Result<(), StoreError>;

    /// Fetch one record by subject key.
    async fn get(
        &self,
        network: Network,
        subject_key: &str,
    ) -> Result<Option<ValidatorSignatureStats>, StoreError>;

    /// All records observed on a network.
    async fn list_by_network(
        &self,
        network: Network,
    ) -> Result<Vec<ValidatorSignatureStats>, StoreError>;

    /// Highest block height present in any record's recent history.
    ///
    /// Drives the gap catch-up start height after a restart.
    async fn latest_height(&self, network: Network) -> Result<Option<u64>, StoreError>;
}

/// Persistence for finality-provider vote statistics.
#[async_trait]
pub trait FinalityProviderStatsRepository: Send + Sync {
    /// Insert or replace the record for `stats.btc_pk_hex`.
    async fn upsert(&self, stats: &FinalityProviderStats) -> Result<(), StoreError>;

    /// Fetch one record by BTC public key hex.
    async fn get(
        &self,
        network: Network,
        btc_pk_hex: &str,
    ) -> Result<Option<FinalityProviderStats>, StoreError>;

    /// All records observed on a network.
    async fn list_by_network(
        &self,
        network: Network,
    ) -> Result<Vec<FinalityProviderStats>, StoreError>;

    /// Highest `end_height` across all records.
    async fn latest_height(&self, network: Network) -> Result<Option<u64>, StoreError>;
}

/// Persistence for per-epoch BLS checkpoint statistics.
#[async_trait]
pub trait BlsStatsRepository: Send + Sync {
    /// Insert or replace the record for `stats.epoch`.
    async fn upsert(&self, stats: &BlsCheckpointStats) -> Result<(), StoreError>;

    /// Fetch one record by epoch.
    async fn get(
        &self,
        network: Network,
        epoch: u64,
    ) -> Result<Option<BlsCheckpointStats>, StoreError>;

    /// All records observed on a network, unordered.
    async fn list_by_network(
        &self,
        network: Network,
    ) -> Result<Vec<BlsCheckpointStats>, StoreError>;
}

/// Persistence for identity records of both signer populations.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Insert or replace a validator record, indexed under all its key forms.
    async fn upsert_validator(&self, identity: &ValidatorIdentity) -> Result<(), StoreError>;

    /// Look a validator up by any of its key forms.
    async fn get_validator(
        &self,
        network: Network,
        key: &str,
    ) -> Result<Option<ValidatorIdentity>, StoreError>;

    /// Insert or replace a finality-provider record.
    async fn upsert_provider(
        &self,
        identity: &FinalityProviderIdentity,
    ) -> Result<(), StoreError>;

    /// Look a provider up by its BTC public key hex.
    async fn get_provider(
        &self,
        network: Network,
        btc_pk_hex: &str,
    ) -> Result<Option<FinalityProviderIdentity>, StoreError>;
}

type Key = (Network, String);

#[derive(Default)]
struct MemoryStoreInner {
    validator_stats: HashMap<Key, ValidatorSignatureStats>,
    fp_stats: HashMap<Key, FinalityProviderStats>,
    bls_stats: HashMap<(Network, u64), BlsCheckpointStats>,
    validators: HashMap<Key, ValidatorIdentity>,
    validator_aliases: HashMap<Key, String>,
    providers: HashMap<Key, FinalityProviderIdentity>,
}

/// In-memory store implementing every repository port.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ValidatorStatsRepository for MemoryStore {
    async fn upsert(&self, stats: &ValidatorSignatureStats) -> Result<(), StoreError> {
        let key = (stats.network, stats.subject_key.clone());
        self.inner.write().validator_stats.insert(key, stats.clone());
        Ok(())
    }

    async fn get(
        &self,
        network: Network,
        subject_key: &str,
    ) -> Result<Option<ValidatorSignatureStats>, StoreError> {
        let key = (network, subject_key.to_string());
        Ok(self.inner.read().validator_stats.get(&key).cloned())
    }

    async fn list_by_network(
        &self,
        network: Network,
    ) -> Result<Vec<ValidatorSignatureStats>, StoreError> {
        Ok(self
            .inner
            .read()
            .validator_stats
            .values()
            .filter(|s| s.network == network)
            .cloned()
            .collect())
    }

    async fn latest_height(&self, network: Network) -> Result<Option<u64>, StoreError> {
        Ok(self
            .inner
            .read()
            .validator_stats
            .values()
            .filter(|s| s.network == network)
            .flat_map(|s| s.recent_blocks.iter().map(|b| b.height))
            .max())
    }
}

#[async_trait]
impl FinalityProviderStatsRepository for MemoryStore {
    async fn upsert(&self, stats: &FinalityProviderStats) -> Result<(), StoreError> {
        let key = (stats.network, stats.btc_pk_hex.clone());
        self.inner.write().fp_stats.insert(key, stats.clone());
        Ok(())
    }

    async fn get(
        &self,
        network: Network,
        btc_pk_hex: &str,
    ) -> Result<Option<FinalityProviderStats>, StoreError> {
        let key = (network, btc_pk_hex.to_string());
        Ok(self.inner.read().fp_stats.get(&key).cloned())
    }

    async fn list_by_network(
        &self,
        network: Network,
    ) -> Result<Vec<FinalityProviderStats>, StoreError> {
        Ok(self
            .inner
            .read()
            .fp_stats
            .values()
            .filter(|s| s.network == network)
            .cloned()
            .collect())
    }

    async fn latest_height(&self, network: Network) -> Result<Option<u64>, StoreError> {
        Ok(self
            .inner
            .read()
            .fp_stats
            .values()
            .filter(|s| s.network == network)
            .map(|s| s.end_height)
            .max())
    }
}

#[async_trait]
impl BlsStatsRepository for MemoryStore {
    async fn upsert(&self, stats: &BlsCheckpointStats) -> Result<(), StoreError> {
        let key = (stats.network, stats.epoch);
        self.inner.write().bls_stats.insert(key, stats.clone());
        Ok(())
    }

    async fn get(
        &self,
        network: Network,
        epoch: u64,
    ) -> Result<Option<BlsCheckpointStats>, StoreError> {
        Ok(self.inner.read().bls_stats.get(&(network, epoch)).cloned())
    }

    async fn list_by_network(
        &self,
        network: Network,
    ) -> Result<Vec<BlsCheckpointStats>, StoreError> {
        Ok(self
            .inner
            .read()
            .bls_stats
            .values()
            .filter(|s| s.network == network)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl IdentityRepository for MemoryStore {
    async fn upsert_validator(&self, identity: &ValidatorIdentity) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let canonical = identity.operator_address.clone();
        for key in identity.all_keys() {
            inner
                .validator_aliases
                .insert((identity.network, key.to_string()), canonical.clone());
        }
        inner
            .validators
            .insert((identity.network, canonical), identity.clone());
        Ok(())
    }

    async fn get_validator(
        &self,
        network: Network,
        key: &str,
    ) -> Result<Option<ValidatorIdentity>, StoreError> {
        let inner = self.inner.read();
        let canonical = match inner.validator_aliases.get(&(network, key.to_string())) {
            Some(canonical) => canonical.clone(),
            None => return Ok(None),
        };
        Ok(inner.validators.get(&(network, canonical)).cloned())
    }

    async fn upsert_provider(
        &self,
        identity: &FinalityProviderIdentity,
    ) -> Result<(), StoreError> {
        let key = (identity.network, identity.btc_pk_hex.clone());
        self.inner.write().providers.insert(key, identity.clone());
        Ok(())
    }

    async fn get_provider(
        &self,
        network: Network,
        btc_pk_hex: &str,
    ) -> Result<Option<FinalityProviderIdentity>, StoreError> {
        let key = (network, btc_pk_hex.to_string());
        Ok(self.inner.read().providers.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::RecentBlock;

    fn sample_stats(key: &str, network: Network, height: u64) -> ValidatorSignatureStats {
        let mut stats = ValidatorSignatureStats::empty(key, network);
        stats.recent_blocks.push(RecentBlock {
            height,
            signed: true,
            round: 0,
            timestamp: height * 1000,
        });
        stats
    }

    #[tokio::test]
    async fn test_validator_stats_upsert_and_get() {
        let store = MemoryStore::new();
        let stats = sample_stats("AA", Network::Mainnet, 10);
        ValidatorStatsRepository::upsert(&store, &stats).await.unwrap();

        let got = ValidatorStatsRepository::get(&store, Network::Mainnet, "AA")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, stats);

        let miss = ValidatorStatsRepository::get(&store, Network::Testnet, "AA")
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_latest_height_spans_subjects() {
        let store = MemoryStore::new();
        ValidatorStatsRepository::upsert(&store, &sample_stats("AA", Network::Mainnet, 10))
            .await
            .unwrap();
        ValidatorStatsRepository::upsert(&store, &sample_stats("BB", Network::Mainnet, 25))
            .await
            .unwrap();

        let latest = ValidatorStatsRepository::latest_height(&store, Network::Mainnet)
            .await
            .unwrap();
        assert_eq!(latest, Some(25));

        let empty = ValidatorStatsRepository::latest_height(&store, Network::Testnet)
            .await
            .unwrap();
        assert_eq!(empty, None);
    }

    #[tokio::test]
    async fn test_validator_lookup_by_any_alias() {
        let store = MemoryStore::new();
        let identity = ValidatorIdentity {
            operator_address: "bbnvaloper1abc".to_string(),
            consensus_address: "bbnvalcons1xyz".to_string(),
            consensus_hex: "A1B2".to_string(),
            consensus_pubkey: "cGs=".to_string(),
            moniker: "node-one".to_string(),
            jailed: false,
            bonded: true,
            network: Network::Mainnet,
        };
        store.upsert_validator(&identity).await.unwrap();

        for key in ["bbnvaloper1abc", "bbnvalcons1xyz", "A1B2", "cGs="] {
            let got = store.get_validator(Network::Mainnet, key).await.unwrap();
            assert_eq!(got.as_ref(), Some(&identity), "lookup by {key}");
        }

        let miss = store.get_validator(Network::Mainnet, "unknown").await.unwrap();
        assert!(miss.is_none());
    }
}
