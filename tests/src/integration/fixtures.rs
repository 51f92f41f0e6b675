//! Shared fixtures: a fully wired monitoring chain with no network access.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use watchtower_aggregate::{
    BlsAggregatorConfig, BlsCheckpointAggregator, FinalityProviderAggregator,
    ProviderAggregatorConfig, ValidatorAggregatorConfig, ValidatorSignatureAggregator,
};
use watchtower_alerts::{AlertGovernor, AlertPolicy};
use watchtower_directory::Directory;
use watchtower_gateway::RestClient;
use watchtower_types::{
    BlockObservation, FinalityProviderIdentity, IdentityRepository, ManualClock, MemoryStore,
    Network, RecordingSink, ValidatorIdentity,
};

/// A timestamp well past every cooldown window.
pub const T0: u64 = 1_700_000_000_000;

/// The full observation-to-alert chain for one network, minus the chain
/// gateway: observations are fed directly into the aggregators.
pub struct Chain {
    pub store: Arc<MemoryStore>,
    pub directory: Arc<Directory>,
    pub validator_agg: ValidatorSignatureAggregator,
    pub provider_agg: FinalityProviderAggregator,
    pub bls_agg: BlsCheckpointAggregator,
    pub governor: Arc<AlertGovernor>,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
}

/// Build the chain with the given alert policy.
pub async fn chain_with_policy(policy: AlertPolicy) -> Chain {
    let store = Arc::new(MemoryStore::new());
    let rest = Arc::new(RestClient::new(vec!["http://127.0.0.1:1".to_string()]).unwrap());
    let (events_tx, _events_rx) = mpsc::channel(16);
    let directory = Arc::new(Directory::new(
        Network::Mainnet,
        rest,
        store.clone(),
        events_tx,
        Duration::from_secs(3600),
    ));

    let sink = Arc::new(RecordingSink::new());
    let clock = Arc::new(ManualClock::at(T0));
    let governor = Arc::new(AlertGovernor::new(
        Network::Mainnet,
        policy,
        sink.clone(),
        clock.clone(),
    ));

    let validator_agg = ValidatorSignatureAggregator::new(
        Network::Mainnet,
        ValidatorAggregatorConfig::default(),
        directory.clone(),
        store.clone(),
        governor.clone(),
    );
    let provider_agg = FinalityProviderAggregator::new(
        Network::Mainnet,
        ProviderAggregatorConfig::default(),
        directory.clone(),
        store.clone(),
        governor.clone(),
    );
    let bls_agg = BlsCheckpointAggregator::new(
        Network::Mainnet,
        BlsAggregatorConfig::default(),
        store.clone(),
        governor.clone(),
        clock.clone(),
    );

    Chain {
        store,
        directory,
        validator_agg,
        provider_agg,
        bls_agg,
        governor,
        sink,
        clock,
    }
}

/// Build the chain with the default policy.
pub async fn chain() -> Chain {
    chain_with_policy(AlertPolicy::default()).await
}

impl Chain {
    /// Register one bonded validator and warm the directory catalog.
    pub async fn with_validator(&self, consensus_hex: &str, moniker: &str) {
        let identity = ValidatorIdentity {
            operator_address: format!("bbnvaloper1{}", consensus_hex.to_lowercase()),
            consensus_address: format!("bbnvalcons1{}", consensus_hex.to_lowercase()),
            consensus_hex: consensus_hex.to_string(),
            consensus_pubkey: format!("{consensus_hex}64"),
            moniker: moniker.to_string(),
            jailed: false,
            bonded: true,
            network: Network::Mainnet,
        };
        self.store.upsert_validator(&identity).await.unwrap();
        self.directory.lookup_by_any_key(consensus_hex).await.unwrap();
    }

    /// Register one active finality provider and warm the catalog.
    pub async fn with_provider(&self, btc_pk_hex: &str, moniker: &str) {
        let identity = FinalityProviderIdentity {
            btc_pk_hex: btc_pk_hex.to_string(),
            owner_address: "bbn1owner".to_string(),
            moniker: moniker.to_string(),
            jailed: false,
            is_active: true,
            network: Network::Mainnet,
        };
        self.store.upsert_provider(&identity).await.unwrap();
        self.directory.lookup_provider(btc_pk_hex).await.unwrap();
    }

    /// Feed one block where the given validators signed.
    pub async fn feed_block(&self, height: u64, signers: &[&str]) {
        let observation = BlockObservation {
            height,
            timestamp: height * 1_000,
            round: 0,
            signers: signers.iter().map(|s| s.to_string()).collect(),
            fp_signers: None,
        };
        self.validator_agg.process(&observation).await;
    }

    /// Feed one block where the given providers voted.
    pub async fn feed_fp_block(&self, height: u64, voters: &[&str]) {
        let observation = BlockObservation {
            height,
            timestamp: height * 1_000,
            round: 0,
            signers: HashSet::new(),
            fp_signers: Some(voters.iter().map(|s| s.to_string()).collect()),
        };
        self.provider_agg.process(&observation).await;
    }

    /// Titles of every alert delivered so far, in order.
    pub fn alert_titles(&self) -> Vec<String> {
        self.sink.alerts().into_iter().map(|a| a.title).collect()
    }
}
