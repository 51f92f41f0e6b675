//! Directory service: refresh, multi-key lookup, and jailed transitions.

use crate::address::derive_consensus_addresses;
use crate::catalog::Catalog;
use crate::error::DirectoryResult;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use watchtower_gateway::chaindata::{
    ActiveProvidersResponse, ProvidersResponse, ValidatorsResponse,
};
use watchtower_gateway::RestClient;
use watchtower_types::{
    FinalityProviderIdentity, IdentityRepository, Network, ValidatorIdentity,
};

/// Page size for the staking validator catalog.
const VALIDATOR_PAGE_LIMIT: u32 = 200;

/// Page size for the finality-provider catalog.
const PROVIDER_PAGE_LIMIT: u32 = 1000;

/// Which signer population a directory event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    /// A consensus validator.
    Validator,
    /// A BTC-staking finality provider.
    FinalityProvider,
}

/// A jailed-flag transition detected during refresh.
#[derive(Debug, Clone)]
pub struct DirectoryEvent {
    /// Population the subject belongs to.
    pub kind: SubjectKind,
    /// Canonical key of the subject.
    pub key: String,
    /// Display name at the time of the transition.
    pub moniker: String,
    /// The fresh jailed flag.
    pub jailed: bool,
}

/// Outcome of one refresh, for logging.
#[derive(Debug, Clone, Copy)]
pub struct RefreshSummary {
    /// Validators in the fresh catalog.
    pub validators: usize,
    /// Providers in the fresh catalog.
    pub providers: usize,
    /// Jailed transitions detected against the previous catalog.
    pub transitions: usize,
}

/// Identity directory for one network.
pub struct Directory {
    network: Network,
    rest: Arc<RestClient>,
    identities: Arc<dyn IdentityRepository>,
    catalog: RwLock<Catalog>,
    events_tx: mpsc::Sender<DirectoryEvent>,
    refresh_interval: Duration,
}

impl Directory {
    /// Create a directory with an empty catalog.
    pub fn new(
        network: Network,
        rest: Arc<RestClient>,
        identities: Arc<dyn IdentityRepository>,
        events_tx: mpsc::Sender<DirectoryEvent>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            network,
            rest,
            identities,
            catalog: RwLock::new(Catalog::new()),
            events_tx,
            refresh_interval,
        }
    }

    /// Fetch both catalogs, swap the in-memory state, persist, and emit
    /// jailed transitions.
    pub async fn refresh(&self) -> DirectoryResult<RefreshSummary> {
        let validators = self.fetch_validators().await?;
        let providers = self.fetch_providers().await?;

        let transitions = {
            let old = self.catalog.read();
            detect_transitions(&old, &validators, &providers)
        };

        let mut fresh = Catalog::new();
        for validator in &validators {
            fresh.insert_validator(validator.clone());
        }
        for provider in &providers {
            fresh.insert_provider(provider.clone());
        }
        *self.catalog.write() = fresh;

        for validator in &validators {
            if let Err(e) = self.identities.upsert_validator(validator).await {
                warn!(subject = %validator.operator_address, error = %e, "identity write abandoned");
            }
        }
        for provider in &providers {
            if let Err(e) = self.identities.upsert_provider(provider).await {
                warn!(subject = %provider.btc_pk_hex, error = %e, "identity write abandoned");
            }
        }

        let summary = RefreshSummary {
            validators: validators.len(),
            providers: providers.len(),
            transitions: transitions.len(),
        };
        for event in transitions {
            let _ = self.events_tx.send(event).await;
        }

        info!(
            network = %self.network,
            validators = summary.validators,
            providers = summary.providers,
            transitions = summary.transitions,
            "directory refreshed"
        );
        Ok(summary)
    }

    /// Drive periodic refresh until shutdown.
    pub async fn run_refresh_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut timer = tokio::time::interval(self.refresh_interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = self.refresh().await {
                        warn!(network = %self.network, error = %e, "directory refresh failed");
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

    /// Resolve a validator by any key form: catalog first, then store.
    ///
    /// A store hit warms the catalog with every alias of the record.
    pub async fn lookup_by_any_key(&self, key: &str) -> Option<ValidatorIdentity> {
        if let Some(identity) = self.catalog.read().validator(key).cloned() {
            return Some(identity);
        }
        match self.identities.get_validator(self.network, key).await {
            Ok(Some(identity)) => {
                self.catalog.write().insert_validator(identity.clone());
                Some(identity)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "identity store lookup failed");
                None
            }
        }
    }

    /// Resolve a finality provider: catalog first, then store.
    pub async fn lookup_provider(&self, btc_pk_hex: &str) -> Option<FinalityProviderIdentity> {
        if let Some(identity) = self.catalog.read().provider(btc_pk_hex).cloned() {
            return Some(identity);
        }
        match self.identities.get_provider(self.network, btc_pk_hex).await {
            Ok(Some(identity)) => {
                self.catalog.write().insert_provider(identity.clone());
                Some(identity)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = btc_pk_hex, error = %e, "identity store lookup failed");
                None
            }
        }
    }

    /// Providers active at a height; updates `is_active` on the catalog.
    pub async fn active_finality_providers(&self, height: u64) -> DirectoryResult<Vec<String>> {
        let path = format!("/babylon/finality/v1/finality_providers/{height}");
        let response: ActiveProvidersResponse = self.rest.get(&path, &[]).await?;
        let active: Vec<String> = response
            .finality_providers
            .into_iter()
            .map(|p| p.btc_pk_hex)
            .collect();

        let changed: Vec<FinalityProviderIdentity> = {
            let mut catalog = self.catalog.write();
            let keys: Vec<String> = catalog.providers().map(|p| p.btc_pk_hex.clone()).collect();
            let mut changed = Vec::new();
            for key in keys {
                let now_active = active.iter().any(|a| a == &key);
                if let Some(record) = catalog.provider_mut(&key) {
                    if record.is_active != now_active {
                        record.is_active = now_active;
                        changed.push(record.clone());
                    }
                }
            }
            changed
        };
        for record in &changed {
            if let Err(e) = self.identities.upsert_provider(record).await {
                warn!(subject = %record.btc_pk_hex, error = %e, "identity write abandoned");
            }
        }

        debug!(height, active = active.len(), "active provider set fetched");
        Ok(active)
    }

    /// Consensus hex and moniker of every bonded validator.
    ///
    /// The block-signature aggregator walks this set per height; unbonded
    /// validators keep their catalog entry for lookups but accrue no
    /// per-block stats.
    pub fn bonded_validator_keys(&self) -> Vec<(String, String)> {
        self.catalog
            .read()
            .validators()
            .filter(|v| v.bonded)
            .map(|v| (v.consensus_hex.clone(), v.moniker.clone()))
            .collect()
    }

    /// BTC public keys of providers currently flagged active.
    pub fn active_provider_keys(&self) -> Vec<String> {
        self.catalog
            .read()
            .providers()
            .filter(|p| p.is_active)
            .map(|p| p.btc_pk_hex.clone())
            .collect()
    }

    /// Snapshot of a provider's directory flags for stat stamping.
    pub fn provider_flags(&self, btc_pk_hex: &str) -> Option<(bool, bool)> {
        self.catalog
            .read()
            .provider(btc_pk_hex)
            .map(|p| (p.jailed, p.is_active))
    }

    /// Snapshot of a validator's moniker, by any key form.
    pub fn validator_moniker(&self, key: &str) -> Option<String> {
        self.catalog.read().validator(key).map(|v| v.moniker.clone())
    }

    /// Snapshot of a provider's moniker.
    pub fn provider_moniker(&self, btc_pk_hex: &str) -> Option<String> {
        self.catalog
            .read()
            .provider(btc_pk_hex)
            .map(|p| p.moniker.clone())
    }

    async fn fetch_validators(&self) -> DirectoryResult<Vec<ValidatorIdentity>> {
        let mut identities = Vec::new();
        let mut page_key: Option<String> = None;

        loop {
            let mut query = vec![("pagination.limit", VALIDATOR_PAGE_LIMIT.to_string())];
            if let Some(key) = &page_key {
                query.push(("pagination.key", key.clone()));
            }
            let page: ValidatorsResponse = self
                .rest
                .get("/cosmos/staking/v1beta1/validators", &query)
                .await?;

            for validator in page.validators {
                let derived = derive_consensus_addresses(
                    &validator.consensus_pubkey.key,
                    self.network.valcons_prefix(),
                );
                let (consensus_address, consensus_hex) = match derived {
                    Ok(pair) => pair,
                    Err(e) => {
                        debug!(
                            subject = %validator.operator_address,
                            error = %e,
                            "consensus key skipped"
                        );
                        continue;
                    }
                };
                identities.push(ValidatorIdentity {
                    operator_address: validator.operator_address,
                    consensus_address,
                    consensus_hex,
                    consensus_pubkey: validator.consensus_pubkey.key,
                    moniker: validator.description.moniker,
                    jailed: validator.jailed,
                    bonded: validator.status == "BOND_STATUS_BONDED",
                    network: self.network,
                });
            }

            page_key = page.pagination.next_key.filter(|k| !k.is_empty());
            if page_key.is_none() {
                break;
            }
        }
        Ok(identities)
    }

    async fn fetch_providers(&self) -> DirectoryResult<Vec<FinalityProviderIdentity>> {
        let query = vec![("pagination.limit", PROVIDER_PAGE_LIMIT.to_string())];
        let response: ProvidersResponse = self
            .rest
            .get("/babylon/btcstaking/v1/finality_providers", &query)
            .await?;

        let previous_active: Vec<(String, bool)> = {
            let catalog = self.catalog.read();
            catalog
                .providers()
                .map(|p| (p.btc_pk_hex.clone(), p.is_active))
                .collect()
        };

        Ok(response
            .finality_providers
            .into_iter()
            .map(|p| {
                // Keep the previously observed active flag across refreshes;
                // the active set is stamped separately per height.
                let is_active = previous_active
                    .iter()
                    .find(|(key, _)| key == &p.btc_pk)
                    .map(|(_, active)| *active)
                    .unwrap_or(false);
                FinalityProviderIdentity {
                    btc_pk_hex: p.btc_pk,
                    owner_address: p.addr,
                    moniker: p.description.moniker,
                    jailed: p.jailed,
                    is_active,
                    network: self.network,
                }
            })
            .collect())
    }
}

/// Compare fresh records against the current catalog; first sighting of a
/// subject is a baseline, not a transition.
fn detect_transitions(
    old: &Catalog,
    validators: &[ValidatorIdentity],
    providers: &[FinalityProviderIdentity],
) -> Vec<DirectoryEvent> {
    let mut events = Vec::new();
    for validator in validators {
        if let Some(previous) = old.validator(&validator.operator_address) {
            if previous.jailed != validator.jailed {
                events.push(DirectoryEvent {
                    kind: SubjectKind::Validator,
                    key: validator.operator_address.clone(),
                    moniker: validator.moniker.clone(),
                    jailed: validator.jailed,
                });
            }
        }
    }
    for provider in providers {
        if let Some(previous) = old.provider(&provider.btc_pk_hex) {
            if previous.jailed != provider.jailed {
                events.push(DirectoryEvent {
                    kind: SubjectKind::FinalityProvider,
                    key: provider.btc_pk_hex.clone(),
                    moniker: provider.moniker.clone(),
                    jailed: provider.jailed,
                });
            }
        }
    }
    events
}
