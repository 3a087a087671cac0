//! `http`: call an endpoint with the pub's values.

use schemas::{CoreSchemaType, ObjectSchema};
use serde_json::{json, Value};

use crate::traits::{HttpRequest, HttpResponse};
use crate::{template, ActionContext, ActionError};

pub const METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

pub fn config_schema() -> ObjectSchema {
    ObjectSchema::new()
        .required("url", CoreSchemaType::Url, "Endpoint to call")
        .optional("method", CoreSchemaType::String, "HTTP method")
        .one_of(METHODS)
        .with_default(json!("POST"))
        .optional(
            "body",
            CoreSchemaType::String,
            "Request body template; defaults to the pub as JSON",
        )
}

pub fn params_schema() -> ObjectSchema {
    ObjectSchema::new()
}

pub async fn run(ctx: &ActionContext) -> Result<Value, ActionError> {
    let method = ctx.setting_str("method").unwrap_or("POST").to_owned();
    let url = ctx.require_str("url")?.to_owned();

    let body = match method.as_str() {
        "GET" | "DELETE" => None,
        _ => Some(match ctx.setting_str("body") {
            Some(t) => Value::String(template::render(t, ctx)),
            None => json!({
                "pubId": ctx.pub_row.id,
                "pubTypeId": ctx.pub_row.pub_type_id,
                "values": ctx.pub_row.values,
            }),
        }),
    };

    let response = ctx
        .services
        .http
        .send(HttpRequest {
            method,
            url,
            headers: Vec::new(),
            body,
            idempotency_key: ctx.dedup_key.clone(),
        })
        .await?;

    let response = classify_response(response)?;
    Ok(json!({ "status": response.status, "body": response.body }))
}

/// Map a response status onto the action error model: 2xx succeeds, 429 and
/// 5xx are retryable, anything else is fatal.
pub fn classify_response(response: HttpResponse) -> Result<HttpResponse, ActionError> {
    match response.status {
        200..=299 => Ok(response),
        429 | 500..=599 => Err(ActionError::Retryable(format!(
            "endpoint returned {}: {}",
            response.status, response.body
        ))),
        status => Err(ActionError::Fatal(format!(
            "endpoint returned {status}: {}",
            response.body
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockServices;

    #[tokio::test]
    async fn posts_pub_values_by_default() {
        let mocks = MockServices::new();
        let ctx = mocks.context(json!({ "url": "https://hooks.example.org/in" }));

        let out = run(&ctx).await.unwrap();
        assert_eq!(out["status"], 200);

        let requests = mocks.http.requests();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].body.as_ref().unwrap()["pubId"], json!(ctx.pub_row.id));
    }

    #[tokio::test]
    async fn server_errors_are_retryable_and_client_errors_fatal() {
        let mocks = MockServices::new();
        let ctx = mocks.context(json!({ "url": "https://hooks.example.org/in", "method": "GET" }));

        mocks.http.respond_with(503, json!("busy"));
        assert!(matches!(run(&ctx).await, Err(ActionError::Retryable(_))));

        mocks.http.respond_with(404, json!("gone"));
        assert!(matches!(run(&ctx).await, Err(ActionError::Fatal(_))));
        assert!(mocks.http.requests()[1].body.is_none());
    }
}
