//! The engine as the `move` action's [`PubMover`].

use std::sync::Weak;

use async_trait::async_trait;
use serde_json::{json, Value};

use actions::traits::MoveRequest;
use actions::{ActionError, PubMover};

use crate::{EngineError, WorkflowEngine};

/// Holds the engine weakly; the engine owns this through its `Services`.
pub(crate) struct EngineMover {
    engine: Weak<WorkflowEngine>,
}

impl EngineMover {
    pub(crate) fn new(engine: Weak<WorkflowEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl PubMover for EngineMover {
    async fn move_pub(&self, request: MoveRequest) -> Result<Value, ActionError> {
        let engine = self
            .engine
            .upgrade()
            .ok_or_else(|| ActionError::Retryable("workflow engine is shutting down".into()))?;

        let outcome = engine
            .move_pub_at_depth(
                request.pub_id,
                request.from_stage_id,
                request.to_stage_id,
                request.cascade_depth,
            )
            .await
            .map_err(|e| match e {
                EngineError::Database(_) => ActionError::Retryable(e.to_string()),
                other => ActionError::Fatal(other.to_string()),
            })?;

        Ok(json!({
            "pubId": outcome.pub_id,
            "toStageId": outcome.to_stage_id,
            "occupancyId": outcome.occupancy.id,
            "summary": outcome.summary(),
        }))
    }
}
