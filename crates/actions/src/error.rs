//! Action-level error types.

use thiserror::Error;

/// Errors returned by an action's `run`.
///
/// The variant decides retry eligibility:
/// - `Retryable`: transient; a later scheduler pass or manual re-run may retry.
/// - `Fatal`: permanent for this input; retrying will not help.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// Transient failure.
    #[error("retryable action error: {0}")]
    Retryable(String),

    /// Permanent failure.
    #[error("fatal action error: {0}")]
    Fatal(String),
}

impl ActionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// A name that is not in the action catalog.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown action kind: '{0}'")]
pub struct UnknownActionKind(pub String);
