//! Engine-level error types.

use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use actions::ActionError;

use crate::ordering::OrderKeyError;
use crate::rules::UnknownEventKind;

/// Errors returned synchronously by engine operations.
///
/// Per-action failures during a move are not in here; they are collected as
/// [`InvocationError`]s in the move's outcome.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Move errors ------

    /// No move constraint leads from `from` to `to`.
    #[error("illegal transition from stage {from} to stage {to}")]
    IllegalTransition { from: Uuid, to: Uuid },

    #[error("pub {pub_id} is not in stage {stage_id}")]
    NotInStage { pub_id: Uuid, stage_id: Uuid },

    #[error("pub {pub_id} is already in stage {stage_id}")]
    AlreadyInStage { pub_id: Uuid, stage_id: Uuid },

    /// A chain of `move` actions went deeper than the configured limit.
    #[error("move cascade exceeded depth {0}")]
    CascadeLimit(u32),

    // ------ Configuration errors ------

    #[error(transparent)]
    UnknownActionKind(#[from] actions::UnknownActionKind),

    #[error(transparent)]
    UnknownEventKind(#[from] UnknownEventKind),

    #[error("invalid config for action '{kind}': {issues}")]
    ConfigValidation { kind: String, issues: String },

    #[error("invalid params for action '{kind}': {issues}")]
    ParamsValidation { kind: String, issues: String },

    #[error("invalid additional config for rule '{event}': {issues}")]
    RuleConfigValidation { event: String, issues: String },

    #[error("invalid pub values: {0}")]
    PubValidation(String),

    #[error("action instance {action_instance_id} already has a '{event}' rule")]
    DuplicateBinding { event: String, action_instance_id: Uuid },

    #[error("stage {0} still has pubs in it")]
    StageOccupied(Uuid),

    #[error("{what} {id} belongs to another community")]
    CommunityMismatch { what: &'static str, id: Uuid },

    #[error(transparent)]
    OrderKey(#[from] OrderKeyError),

    #[error("schema error: {0}")]
    Schema(#[from] schemas::SchemaError),

    // ------ Lookup errors ------

    #[error("stage {0} not found")]
    StageNotFound(Uuid),

    #[error("pub {0} not found")]
    PubNotFound(Uuid),

    #[error("pub type {0} not found")]
    PubTypeNotFound(Uuid),

    #[error("action instance {0} not found")]
    ActionInstanceNotFound(Uuid),

    #[error("rule binding {0} not found")]
    RuleBindingNotFound(Uuid),

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}

/// Why one action invocation failed. Recorded in the run log and returned in
/// the outcome; never aborts the triggering move.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvocationError {
    #[error("unknown action kind '{0}'")]
    UnknownActionKind(String),

    #[error("invalid config: {0}")]
    ConfigValidation(String),

    #[error("invalid params: {0}")]
    ParamsValidation(String),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("action timed out after {0:?}")]
    Timeout(Duration),

    #[error("storage error: {0}")]
    Storage(String),
}

impl InvocationError {
    /// Whether a later pass may succeed with the same inputs.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Action(e) => e.is_retryable(),
            Self::Timeout(_) | Self::Storage(_) => true,
            Self::UnknownActionKind(_) | Self::ConfigValidation(_) | Self::ParamsValidation(_) => {
                false
            }
        }
    }
}

impl Serialize for InvocationError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
