//! `move`: send the pub on to another stage.

use schemas::{CoreSchemaType, ObjectSchema};
use serde_json::Value;
use uuid::Uuid;

use crate::traits::MoveRequest;
use crate::{ActionContext, ActionError};

pub fn config_schema() -> ObjectSchema {
    ObjectSchema::new().required("stage", CoreSchemaType::String, "Id of the destination stage")
}

pub fn params_schema() -> ObjectSchema {
    ObjectSchema::new().optional("stage", CoreSchemaType::String, "Overrides the destination stage")
}

/// Moves the pub out of the stage the action is configured on. The move goes
/// through the engine, so it is subject to the stage's move constraints and
/// fires the usual entered/left rules one cascade level deeper.
pub async fn run(ctx: &ActionContext) -> Result<Value, ActionError> {
    let raw = ctx.require_str("stage")?;
    let to_stage_id = Uuid::parse_str(raw)
        .map_err(|_| ActionError::Fatal(format!("'{raw}' is not a stage id")))?;

    ctx.services
        .mover
        .move_pub(MoveRequest {
            pub_id: ctx.pub_row.id,
            from_stage_id: Some(ctx.stage_id),
            to_stage_id,
            cascade_depth: ctx.cascade_depth + 1,
        })
        .await
}
