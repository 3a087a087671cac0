//! Engine tuning knobs.

use std::time::Duration;

/// Configuration for [`crate::WorkflowEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for a single action `run`. A run that exceeds it is recorded
    /// as a failure and stays eligible for retry.
    pub action_timeout: Duration,
    /// A dedup key is not re-claimed after this many failed attempts.
    pub max_attempts: u32,
    /// A claim held longer than this is assumed abandoned (crashed worker).
    pub claim_lease: Duration,
    /// Maximum chain of `move` actions triggering further moves.
    pub max_cascade_depth: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_secs(30),
            max_attempts: 3,
            claim_lease: Duration::from_secs(300),
            max_cascade_depth: 8,
        }
    }
}
