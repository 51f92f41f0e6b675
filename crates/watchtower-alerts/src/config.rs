//! Alert governor policy.

use std::collections::HashSet;

/// Thresholds, cooldowns, and tracking filters for the governor.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    /// Rate threshold for validator block signatures, in percent.
    pub validator_rate_threshold: f64,
    /// Rate threshold for finality-provider votes, in percent.
    pub provider_rate_threshold: f64,
    /// Rate threshold for aggregate BLS participation by power, in percent.
    pub bls_rate_threshold: f64,
    /// Minimum interval between repeat rate alerts for one subject.
    pub min_alert_interval_ms: u64,
    /// Minimum rate worsening before a repeat LOW alert, in percentage points.
    pub rate_min_drop: f64,
    /// Bucket width for the finality-provider step comparison.
    pub provider_rate_step: f64,
    /// Observations required before rate rules engage.
    pub min_window_blocks: u64,
    /// Consecutive misses that trigger a validator critical.
    pub consecutive_miss_threshold: u64,
    /// Window of most recent heights inspected by the provider miss rule.
    pub recent_miss_window: u64,
    /// Misses within the window that trigger a provider critical.
    pub recent_miss_threshold: usize,
    /// Interval after which an outstanding provider critical may repeat.
    pub critical_repeat_interval_ms: u64,
    /// Validators eligible for alerts; empty tracks all.
    pub tracked_validators: HashSet<String>,
    /// Providers eligible for alerts; empty tracks all.
    pub tracked_providers: HashSet<String>,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            validator_rate_threshold: 90.0,
            provider_rate_threshold: 90.0,
            bls_rate_threshold: 90.0,
            min_alert_interval_ms: 21_600_000,
            rate_min_drop: 10.0,
            provider_rate_step: 5.0,
            min_window_blocks: 100,
            consecutive_miss_threshold: 5,
            recent_miss_window: 5,
            recent_miss_threshold: 3,
            critical_repeat_interval_ms: 3_600_000,
            tracked_validators: HashSet::new(),
            tracked_providers: HashSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_values() {
        let policy = AlertPolicy::default();
        assert_eq!(policy.validator_rate_threshold, 90.0);
        assert_eq!(policy.min_alert_interval_ms, 21_600_000);
        assert_eq!(policy.rate_min_drop, 10.0);
        assert_eq!(policy.consecutive_miss_threshold, 5);
        assert!(policy.tracked_validators.is_empty());
    }
}
