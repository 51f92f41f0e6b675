//! In-memory identity catalog with multi-key validator resolution.

use std::collections::HashMap;
use watchtower_types::{FinalityProviderIdentity, ValidatorIdentity};

/// The in-memory catalog behind the directory's read path.
///
/// Validators are stored once under their operator address; every other
/// key form is an alias pointing at it. A refresh builds a fresh catalog
/// off to the side and swaps it in whole, so readers never observe a
/// half-replaced set.
#[derive(Debug, Default)]
pub struct Catalog {
    validators: HashMap<String, ValidatorIdentity>,
    validator_aliases: HashMap<String, String>,
    providers: HashMap<String, FinalityProviderIdentity>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a validator under all of its key forms.
    pub fn insert_validator(&mut self, identity: ValidatorIdentity) {
        let canonical = identity.operator_address.clone();
        for key in identity.all_keys() {
            self.validator_aliases
                .insert(key.to_string(), canonical.clone());
        }
        self.validators.insert(canonical, identity);
    }

    /// Resolve a validator by any known key form.
    pub fn validator(&self, key: &str) -> Option<&ValidatorIdentity> {
        let canonical = self.validator_aliases.get(key)?;
        self.validators.get(canonical)
    }

    /// Insert a finality provider under its BTC public key.
    pub fn insert_provider(&mut self, identity: FinalityProviderIdentity) {
        self.providers.insert(identity.btc_pk_hex.clone(), identity);
    }

    /// Resolve a provider by BTC public key hex.
    pub fn provider(&self, btc_pk_hex: &str) -> Option<&FinalityProviderIdentity> {
        self.providers.get(btc_pk_hex)
    }

    /// Mutable access to a provider record, for flag updates.
    pub fn provider_mut(&mut self, btc_pk_hex: &str) -> Option<&mut FinalityProviderIdentity> {
        self.providers.get_mut(btc_pk_hex)
    }

    /// Iterate all provider records.
    pub fn providers(&self) -> impl Iterator<Item = &FinalityProviderIdentity> {
        self.providers.values()
    }

    /// Iterate all validator records.
    pub fn validators(&self) -> impl Iterator<Item = &ValidatorIdentity> {
        self.validators.values()
    }

    /// Number of validators.
    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    /// Number of providers.
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}
