//! `log`: write the pub to the service log.

use schemas::{CoreSchemaType, ObjectSchema};
use serde_json::{json, Value};
use tracing::info;

use crate::{template, ActionContext, ActionError};

pub fn config_schema() -> ObjectSchema {
    ObjectSchema::new().optional("text", CoreSchemaType::String, "Message to log alongside the pub")
}

pub fn params_schema() -> ObjectSchema {
    ObjectSchema::new().optional("text", CoreSchemaType::String, "Overrides the configured message")
}

pub async fn run(ctx: &ActionContext) -> Result<Value, ActionError> {
    let text = ctx.setting_str("text").map(|t| template::render(t, ctx));
    info!(
        pub_id = %ctx.pub_row.id,
        action_instance_id = %ctx.action_instance_id,
        text = text.as_deref().unwrap_or(""),
        "log action"
    );
    Ok(json!({ "pubId": ctx.pub_row.id, "text": text }))
}
