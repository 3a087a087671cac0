//! `pdf`: render the pub through the configured exporter.

use schemas::{CoreSchemaType, ObjectSchema};
use serde_json::{json, Value};

use crate::traits::ExportRequest;
use crate::{ActionContext, ActionError};

pub fn config_schema() -> ObjectSchema {
    ObjectSchema::new()
        .optional("pageSize", CoreSchemaType::String, "Paper size")
        .one_of(["A4", "Letter"])
        .with_default(json!("A4"))
        .optional("margin", CoreSchemaType::Number, "Page margin in millimetres")
        .minimum(0.0)
}

pub fn params_schema() -> ObjectSchema {
    ObjectSchema::new()
}

pub async fn run(ctx: &ActionContext) -> Result<Value, ActionError> {
    let mut options = json!({ "pageSize": ctx.setting_str("pageSize").unwrap_or("A4") });
    if let Some(margin) = ctx.setting("margin") {
        options["margin"] = margin.clone();
    }

    ctx.services
        .exporter
        .export(ExportRequest {
            format: "pdf".into(),
            pub_row: ctx.pub_row.clone(),
            options,
            idempotency_key: ctx.dedup_key.clone(),
        })
        .await
}
