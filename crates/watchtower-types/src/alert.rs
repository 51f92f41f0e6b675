//! Outbound alert records handed to notification sinks.

use crate::network::Network;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Alert severity, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    /// Informational, e.g. a recovery or an unjail.
    Info,
    /// Degraded but not yet critical, e.g. low aggregate participation.
    Warning,
    /// Requires operator attention, e.g. jailing or a miss streak.
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A structured notification produced by the alert governor.
///
/// Delivery is at-most-once: the governor advances its state before the
/// sink reports success, and never retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Short headline, e.g. `"Validator signature rate low"`.
    pub title: String,
    /// Full human-readable message body.
    pub message: String,
    /// Severity class.
    pub severity: AlertSeverity,
    /// Network the alert concerns.
    pub network: Network,
    /// Unix milliseconds the alert was raised at.
    pub timestamp: u64,
    /// Structured context for downstream transports (subject, rate, heights).
    pub metadata: BTreeMap<String, String>,
}

impl Alert {
    /// Build an alert with an empty metadata map.
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        severity: AlertSeverity,
        network: Network,
        timestamp: u64,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
            network,
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach one metadata entry, builder style.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
