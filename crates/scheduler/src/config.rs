use std::time::Duration;

/// Tuning knobs for [`crate::DurationWatcher`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between scans.
    pub interval: Duration,
    /// Maximum invocations in flight during one scan.
    pub max_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_concurrency: 8,
        }
    }
}
