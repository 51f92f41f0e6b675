//! Environment-driven configuration.
//!
//! Every knob of the daemon comes from the environment; defaults follow
//! the values documented alongside each key. Lookups go through a
//! caller-supplied closure so tests never touch the process environment.

use std::collections::HashSet;
use thiserror::Error;
use watchtower_alerts::AlertPolicy;
use watchtower_types::Network;

/// Configuration errors; fatal at bootstrap.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value failed to parse.
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    /// Monitoring is enabled but no network has endpoints configured.
    #[error("no networks configured: set MAINNET_RPC_URLS and/or TESTNET_RPC_URLS")]
    NoNetworks,
}

/// Per-network settings.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// The network this orchestrator watches.
    pub network: Network,
    /// REST endpoints, rotated on failure.
    pub rpc_urls: Vec<String>,
    /// WebSocket endpoints, derived from REST when unset.
    pub ws_urls: Vec<String>,
}

/// Full daemon configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Store connection string; in-memory store when unset.
    pub store_uri: Option<String>,
    /// Master monitoring switch.
    pub monitoring_enabled: bool,
    /// Validator block-signature subsystem switch.
    pub validator_monitoring: bool,
    /// Finality-provider subsystem switch.
    pub fp_monitoring: bool,
    /// BLS checkpoint subsystem switch.
    pub bls_monitoring: bool,
    /// Base timer interval in milliseconds.
    pub monitoring_interval_ms: u64,
    /// Finality lag in blocks.
    pub finality_lag: u64,
    /// Alert governor policy.
    pub policy: AlertPolicy,
    /// One entry per configured network.
    pub networks: Vec<NetworkConfig>,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let monitoring_enabled = parse_bool(&lookup, "MONITORING_ENABLED", true)?;

        let mut networks = Vec::new();
        for (network, rpc_key, ws_key) in [
            (Network::Mainnet, "MAINNET_RPC_URLS", "MAINNET_WS_URLS"),
            (Network::Testnet, "TESTNET_RPC_URLS", "TESTNET_WS_URLS"),
        ] {
            let rpc_urls = parse_list(lookup(rpc_key));
            if rpc_urls.is_empty() {
                continue;
            }
            let ws_urls = {
                let explicit = parse_list(lookup(ws_key));
                if explicit.is_empty() {
                    rpc_urls.iter().map(|url| derive_ws_url(url)).collect()
                } else {
                    explicit
                }
            };
            networks.push(NetworkConfig {
                network,
                rpc_urls,
                ws_urls,
            });
        }
        if monitoring_enabled && networks.is_empty() {
            return Err(ConfigError::NoNetworks);
        }

        let policy = AlertPolicy {
            validator_rate_threshold: parse_f64(&lookup, "VALIDATOR_SIGNATURE_THRESHOLD", 90.0)?,
            provider_rate_threshold: parse_f64(
                &lookup,
                "FINALITY_PROVIDER_SIGNATURE_THRESHOLD",
                90.0,
            )?,
            bls_rate_threshold: parse_f64(&lookup, "BLS_SIGNATURE_THRESHOLD", 90.0)?,
            min_alert_interval_ms: parse_u64(&lookup, "ALERT_MIN_INTERVAL", 21_600_000)?,
            rate_min_drop: parse_f64(&lookup, "SIGNATURE_RATE_MIN_DROP", 10.0)?,
            tracked_validators: parse_set(lookup("TRACKED_VALIDATORS")),
            tracked_providers: parse_set(lookup("TRACKED_FINALITY_PROVIDERS")),
            ..AlertPolicy::default()
        };

        Ok(Self {
            store_uri: lookup("MONGODB_URI").filter(|v| !v.is_empty()),
            monitoring_enabled,
            validator_monitoring: parse_bool(
                &lookup,
                "VALIDATOR_SIGNATURE_MONITORING_ENABLED",
                true,
            )?,
            fp_monitoring: parse_bool(&lookup, "FINALITY_PROVIDER_MONITORING_ENABLED", true)?,
            bls_monitoring: parse_bool(&lookup, "BLS_SIGNATURE_MONITORING_ENABLED", true)?,
            monitoring_interval_ms: parse_u64(&lookup, "MONITORING_INTERVAL_MS", 60_000)?,
            finality_lag: parse_u64(&lookup, "FINALIZED_BLOCKS_WAIT", 3)?,
            policy,
            networks,
        })
    }
}

/// Swap the protocol and append the websocket path.
fn derive_ws_url(rpc_url: &str) -> String {
    let swapped = if let Some(rest) = rpc_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = rpc_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        rpc_url.to_string()
    };
    let trimmed = swapped.trim_end_matches('/');
    if trimmed.ends_with("/websocket") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/websocket")
    }
}

fn parse_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_set(value: Option<String>) -> HashSet<String> {
    parse_list(value).into_iter().collect()
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "" => Ok(default),
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(ConfigError::Invalid {
                key: key.to_string(),
                reason: format!("expected boolean, got {other:?}"),
            }),
        },
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("{e}"),
        }),
    }
}

fn parse_f64(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: f64,
) -> Result<f64, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("{e}"),
        }),
    }
}
