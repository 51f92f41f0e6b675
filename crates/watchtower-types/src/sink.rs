//! Notification sink port and the bundled reference sinks.

use crate::alert::{Alert, AlertSeverity};
use crate::errors::SinkError;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Outbound alert transport.
///
/// The governor hands every approved alert to exactly one sink call and
/// treats failure as terminal for that alert; retry policy belongs to the
/// transport behind this trait.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one alert.
    async fn send_alert(&self, alert: Alert) -> Result<(), SinkError>;
}

/// Sink that renders alerts through `tracing`, used when no transport is wired.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send_alert(&self, alert: Alert) -> Result<(), SinkError> {
        match alert.severity {
            AlertSeverity::Critical => tracing::error!(
                network = %alert.network,
                title = %alert.title,
                "ALERT: {}",
                alert.message
            ),
            AlertSeverity::Warning => tracing::warn!(
                network = %alert.network,
                title = %alert.title,
                "ALERT: {}",
                alert.message
            ),
            AlertSeverity::Info => tracing::info!(
                network = %alert.network,
                title = %alert.title,
                "ALERT: {}",
                alert.message
            ),
        }
        Ok(())
    }
}

/// Sink that captures alerts in memory so tests can assert exact sequences.
#[derive(Debug, Default)]
pub struct RecordingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every alert delivered so far, in delivery order.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }

    /// Number of alerts delivered so far.
    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    /// Whether no alert has been delivered yet.
    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }

    /// Drop every captured alert.
    pub fn clear(&self) {
        self.alerts.lock().clear();
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send_alert(&self, alert: Alert) -> Result<(), SinkError> {
        self.alerts.lock().push(alert);
        Ok(())
    }
}
