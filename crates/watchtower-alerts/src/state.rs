//! Per-subject alert state.

/// The state one subject carries inside one alert family.
///
/// Created lazily on the subject's first observation, mutated only under
/// the governor's lock, and lost on restart.
#[derive(Debug, Clone, Default)]
pub struct AlertState {
    /// Rate recorded by the last LOW alert; 0 when no LOW cycle is open.
    pub last_alerted_rate: f64,
    /// Whether a recovery was already sent for the current episode.
    pub is_recovering: bool,
    /// Whether a critical alert is outstanding.
    pub sent_critical: bool,
    /// Unix milliseconds of the last critical alert.
    pub last_critical_time: u64,
    /// Unix milliseconds of the last LOW rate alert.
    pub last_rate_alert_time: u64,
    /// Unix milliseconds of the last recovery alert.
    pub last_recovery_time: u64,
    /// Last epoch this subject missed a BLS signature in.
    pub last_missed_epoch: Option<u64>,
}
