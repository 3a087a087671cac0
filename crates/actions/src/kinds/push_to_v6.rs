//! `pushToV6`: publish the pub to a legacy v6 community.

use schemas::{CoreSchemaType, ObjectSchema};
use serde_json::{json, Value};

use crate::kinds::http::classify_response;
use crate::traits::HttpRequest;
use crate::{ActionContext, ActionError};

pub fn config_schema() -> ObjectSchema {
    ObjectSchema::new()
        .required("url", CoreSchemaType::Url, "Base URL of the v6 community")
        .required("authToken", CoreSchemaType::String, "API token for the v6 community")
        .optional("titleField", CoreSchemaType::String, "Pub field used as the v6 title")
        .with_default(json!("title"))
}

pub fn params_schema() -> ObjectSchema {
    ObjectSchema::new()
}

pub async fn run(ctx: &ActionContext) -> Result<Value, ActionError> {
    let base = ctx.require_str("url")?.trim_end_matches('/');
    let token = ctx.require_str("authToken")?;
    let title_field = ctx.setting_str("titleField").unwrap_or("title");

    let title = ctx
        .pub_row
        .values
        .get(title_field)
        .and_then(Value::as_str)
        .ok_or_else(|| ActionError::Fatal(format!("pub has no '{title_field}' value")))?;

    let response = ctx
        .services
        .http
        .send(HttpRequest {
            method: "POST".into(),
            url: format!("{base}/api/pubs"),
            headers: vec![("Authorization".into(), format!("Bearer {token}"))],
            body: Some(json!({
                "title": title,
                "externalId": ctx.pub_row.id,
                "values": ctx.pub_row.values,
            })),
            idempotency_key: ctx.dedup_key.clone(),
        })
        .await?;

    let response = classify_response(response)?;
    Ok(json!({ "status": response.status, "v6Pub": response.body }))
}
