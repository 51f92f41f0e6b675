//! The alert governor: rules, state transitions, and delivery.

use crate::config::AlertPolicy;
use crate::state::AlertState;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use watchtower_aggregate::{
    CheckpointStatsObserver, ProviderStatsObserver, ValidatorStatsObserver,
};
use watchtower_types::{
    Alert, AlertSeverity, BlsCheckpointStats, CheckpointObservation, Clock,
    FinalityProviderStats, Network, NotificationSink, ValidatorSignatureStats,
};

/// Alert families; a subject carries independent state per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Family {
    Validator,
    Provider,
    BlsValidator,
}

/// How a repeat LOW alert must have worsened since the last one.
enum RateStep {
    /// Rate dropped by at least this many percentage points.
    Absolute(f64),
    /// Rate fell into a lower bucket of this width.
    Bucket(f64),
}

/// Outcome of a rate evaluation.
#[derive(Debug, PartialEq, Eq)]
enum RateOutcome {
    Low,
    Recovery,
}

/// One jailed-flag transition, as adapted from the directory's channel.
#[derive(Debug, Clone)]
pub struct JailedSubject {
    /// Canonical subject key.
    pub key: String,
    /// Display name, may be empty.
    pub moniker: String,
    /// Validator or finality provider.
    pub is_validator: bool,
    /// The fresh jailed flag.
    pub jailed: bool,
}

/// Per-network alert governor.
///
/// All state transitions for a subject happen under one lock, then the
/// decided alerts are delivered outside it. State advances whether or not
/// the sink accepts the alert: delivery is at-most-once and never retried.
pub struct AlertGovernor {
    network: Network,
    policy: AlertPolicy,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    states: Mutex<HashMap<(Family, String), AlertState>>,
}

impl AlertGovernor {
    /// Create a governor with no per-subject state.
    pub fn new(
        network: Network,
        policy: AlertPolicy,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            network,
            policy,
            sink,
            clock,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Drop all per-subject state.
    pub fn reset(&self) {
        self.states.lock().clear();
    }

    /// Process one jailed-flag transition; always delivered, no cooldown.
    pub async fn handle_jailed_transition(&self, subject: JailedSubject) {
        let tracked = if subject.is_validator {
            &self.policy.tracked_validators
        } else {
            &self.policy.tracked_providers
        };
        if !is_tracked(tracked, &[&subject.key, &subject.moniker]) {
            return;
        }

        let role = if subject.is_validator {
            "Validator"
        } else {
            "Finality provider"
        };
        let name = display_name(&subject.moniker, &subject.key);
        let alert = if subject.jailed {
            Alert::new(
                format!("{role} jailed"),
                format!("{name} was jailed on {}", self.network),
                AlertSeverity::Critical,
                self.network,
                self.clock.now_ms(),
            )
        } else {
            Alert::new(
                format!("{role} unjailed"),
                format!("{name} is active again on {}", self.network),
                AlertSeverity::Info,
                self.network,
                self.clock.now_ms(),
            )
        };
        self.deliver(alert.with_meta("subject", subject.key)).await;
    }

    async fn deliver(&self, alert: Alert) {
        debug!(network = %self.network, title = %alert.title, "alert approved");
        if let Err(e) = self.sink.send_alert(alert).await {
            warn!(network = %self.network, error = %e, "alert dropped by sink");
        }
    }
}

/// Evaluate the rate-threshold hysteresis against one subject's state.
///
/// A first LOW (no open cycle) fires immediately; a repeat LOW requires
/// both the configured worsening step and the cooldown. Crossing back over
/// the threshold with an open cycle produces one RECOVERY and closes the
/// cycle so a later drop starts fresh.
fn evaluate_rate(
    state: &mut AlertState,
    rate: f64,
    threshold: f64,
    now: u64,
    min_interval_ms: u64,
    step: &RateStep,
) -> Option<RateOutcome> {
    if rate < threshold {
        let first = state.last_alerted_rate == 0.0;
        let worsened = match step {
            RateStep::Absolute(min_drop) => rate <= state.last_alerted_rate - min_drop,
            RateStep::Bucket(width) => {
                (rate / width).floor() < (state.last_alerted_rate / width).floor()
            }
        };
        let cooled = now.saturating_sub(state.last_rate_alert_time) >= min_interval_ms;
        if first || (worsened && cooled) {
            state.last_alerted_rate = rate;
            state.last_rate_alert_time = now;
            state.is_recovering = false;
            return Some(RateOutcome::Low);
        }
        None
    } else if state.last_alerted_rate != 0.0 {
        let cooled = now.saturating_sub(state.last_recovery_time) >= min_interval_ms;
        if !state.is_recovering || cooled {
            state.is_recovering = true;
            state.last_recovery_time = now;
            state.last_alerted_rate = 0.0;
            return Some(RateOutcome::Recovery);
        }
        None
    } else {
        None
    }
}

/// Whether a subject passes the tracking filter.
fn is_tracked(list: &HashSet<String>, keys: &[&str]) -> bool {
    list.is_empty() || keys.iter().any(|key| !key.is_empty() && list.contains(*key))
}

fn display_name<'a>(moniker: &'a str, key: &'a str) -> &'a str {
    if moniker.is_empty() {
        key
    } else {
        moniker
    }
}

#[async_trait]
impl ValidatorStatsObserver for AlertGovernor {
    async fn on_validator_stats(&self, stats: &ValidatorSignatureStats) {
        if !is_tracked(
            &self.policy.tracked_validators,
            &[&stats.subject_key, &stats.moniker],
        ) {
            return;
        }
        let now = self.clock.now_ms();
        let name = display_name(&stats.moniker, &stats.subject_key).to_string();
        let mut alerts = Vec::new();

        {
            let mut states = self.states.lock();
            let state = states
                .entry((Family::Validator, stats.subject_key.clone()))
                .or_default();

            if stats.consecutive_missed >= self.policy.consecutive_miss_threshold
                && !state.sent_critical
            {
                state.sent_critical = true;
                state.last_critical_time = now;
                alerts.push(
                    Alert::new(
                        "Validator missing consecutive blocks",
                        format!(
                            "{name} missed {} consecutive blocks on {}",
                            stats.consecutive_missed, self.network
                        ),
                        AlertSeverity::Critical,
                        self.network,
                        now,
                    )
                    .with_meta("subject", stats.subject_key.clone())
                    .with_meta("consecutive_missed", stats.consecutive_missed.to_string()),
                );
            } else if stats.consecutive_missed == 0 && state.sent_critical {
                state.sent_critical = false;
            }

            if stats.total_blocks_in_window >= self.policy.min_window_blocks {
                let outcome = evaluate_rate(
                    state,
                    stats.signature_rate,
                    self.policy.validator_rate_threshold,
                    now,
                    self.policy.min_alert_interval_ms,
                    &RateStep::Absolute(self.policy.rate_min_drop),
                );
                match outcome {
                    Some(RateOutcome::Low) => alerts.push(
                        Alert::new(
                            "Validator signature rate low",
                            format!(
                                "{name} signs {:.2}% of recent blocks on {}, below {}%",
                                stats.signature_rate,
                                self.network,
                                self.policy.validator_rate_threshold
                            ),
                            AlertSeverity::Warning,
                            self.network,
                            now,
                        )
                        .with_meta("subject", stats.subject_key.clone())
                        .with_meta("rate", format!("{:.2}", stats.signature_rate)),
                    ),
                    Some(RateOutcome::Recovery) => alerts.push(
                        Alert::new(
                            "Validator signature rate recovered",
                            format!(
                                "{name} is back to {:.2}% signed blocks on {}",
                                stats.signature_rate, self.network
                            ),
                            AlertSeverity::Info,
                            self.network,
                            now,
                        )
                        .with_meta("subject", stats.subject_key.clone())
                        .with_meta("rate", format!("{:.2}", stats.signature_rate)),
                    ),
                    None => {}
                }
            }
        }

        for alert in alerts {
            self.deliver(alert).await;
        }
    }
}

#[async_trait]
impl ProviderStatsObserver for AlertGovernor {
    async fn on_provider_stats(&self, stats: &FinalityProviderStats) {
        if !is_tracked(
            &self.policy.tracked_providers,
            &[&stats.btc_pk_hex, &stats.moniker],
        ) {
            return;
        }
        let now = self.clock.now_ms();
        let name = display_name(&stats.moniker, &stats.btc_pk_hex).to_string();
        let mut alerts = Vec::new();

        {
            let mut states = self.states.lock();
            let state = states
                .entry((Family::Provider, stats.btc_pk_hex.clone()))
                .or_default();

            let window_start = stats
                .end_height
                .saturating_sub(self.policy.recent_miss_window.saturating_sub(1));
            let recent_misses = stats
                .missed_block_heights
                .iter()
                .filter(|h| **h >= window_start && **h <= stats.end_height)
                .count();

            if recent_misses >= self.policy.recent_miss_threshold {
                let may_repeat = !state.sent_critical
                    || now.saturating_sub(state.last_critical_time)
                        > self.policy.critical_repeat_interval_ms;
                if may_repeat {
                    state.sent_critical = true;
                    state.last_critical_time = now;
                    alerts.push(
                        Alert::new(
                            "Finality provider missing recent blocks",
                            format!(
                                "{name} missed {recent_misses} of the last {} blocks on {}",
                                self.policy.recent_miss_window, self.network
                            ),
                            AlertSeverity::Critical,
                            self.network,
                            now,
                        )
                        .with_meta("subject", stats.btc_pk_hex.clone())
                        .with_meta("recent_misses", recent_misses.to_string()),
                    );
                }
            } else if recent_misses == 0 && state.sent_critical {
                state.sent_critical = false;
                alerts.push(
                    Alert::new(
                        "Finality provider votes recovered",
                        format!("{name} voted on the last {} blocks on {}",
                            self.policy.recent_miss_window, self.network),
                        AlertSeverity::Info,
                        self.network,
                        now,
                    )
                    .with_meta("subject", stats.btc_pk_hex.clone()),
                );
            }

            if stats.total_blocks >= self.policy.min_window_blocks {
                let outcome = evaluate_rate(
                    state,
                    stats.signature_rate,
                    self.policy.provider_rate_threshold,
                    now,
                    self.policy.min_alert_interval_ms,
                    &RateStep::Bucket(self.policy.provider_rate_step),
                );
                match outcome {
                    Some(RateOutcome::Low) => alerts.push(
                        Alert::new(
                            "Finality provider signature rate low",
                            format!(
                                "{name} voted on {:.2}% of observed blocks on {}, below {}%",
                                stats.signature_rate,
                                self.network,
                                self.policy.provider_rate_threshold
                            ),
                            AlertSeverity::Warning,
                            self.network,
                            now,
                        )
                        .with_meta("subject", stats.btc_pk_hex.clone())
                        .with_meta("rate", format!("{:.2}", stats.signature_rate)),
                    ),
                    Some(RateOutcome::Recovery) => alerts.push(
                        Alert::new(
                            "Finality provider signature rate recovered",
                            format!(
                                "{name} is back to {:.2}% voted blocks on {}",
                                stats.signature_rate, self.network
                            ),
                            AlertSeverity::Info,
                            self.network,
                            now,
                        )
                        .with_meta("subject", stats.btc_pk_hex.clone()),
                    ),
                    None => {}
                }
            }
        }

        for alert in alerts {
            self.deliver(alert).await;
        }
    }
}

#[async_trait]
impl CheckpointStatsObserver for AlertGovernor {
    async fn on_checkpoint_stats(
        &self,
        stats: &BlsCheckpointStats,
        observation: &CheckpointObservation,
    ) {
        let now = self.clock.now_ms();
        let mut alerts = Vec::new();

        {
            let mut states = self.states.lock();
            for vote in &observation.votes {
                if !is_tracked(
                    &self.policy.tracked_validators,
                    &[&vote.address, &vote.moniker],
                ) {
                    continue;
                }
                let state = states
                    .entry((Family::BlsValidator, vote.address.clone()))
                    .or_default();
                let name = display_name(&vote.moniker, &vote.address);

                if !vote.signed {
                    state.last_missed_epoch = Some(observation.epoch);
                    alerts.push(
                        Alert::new(
                            "Validator missed BLS checkpoint signature",
                            format!(
                                "{name} did not sign the checkpoint for epoch {} on {}",
                                observation.epoch, self.network
                            ),
                            AlertSeverity::Critical,
                            self.network,
                            now,
                        )
                        .with_meta("subject", vote.address.clone())
                        .with_meta("epoch", observation.epoch.to_string()),
                    );
                } else if state.last_missed_epoch.is_some() {
                    state.last_missed_epoch = None;
                    alerts.push(
                        Alert::new(
                            "Validator BLS signature recovered",
                            format!(
                                "{name} signed the checkpoint for epoch {} on {}",
                                observation.epoch, self.network
                            ),
                            AlertSeverity::Info,
                            self.network,
                            now,
                        )
                        .with_meta("subject", vote.address.clone())
                        .with_meta("epoch", observation.epoch.to_string()),
                    );
                }
            }
        }

        if stats.total_power > 0 {
            let by_power = 100.0 * stats.signed_power as f64 / stats.total_power as f64;
            if by_power < self.policy.bls_rate_threshold {
                alerts.push(
                    Alert::new(
                        "Low BLS checkpoint participation",
                        format!(
                            "Epoch {} sealed with {:.2}% of power signed on {}, below {}%",
                            stats.epoch, by_power, self.network, self.policy.bls_rate_threshold
                        ),
                        AlertSeverity::Warning,
                        self.network,
                        now,
                    )
                    .with_meta("epoch", stats.epoch.to_string())
                    .with_meta("rate_by_power", format!("{by_power:.2}")),
                );
            }
        }

        for alert in alerts {
            self.deliver(alert).await;
        }
    }
}
