//! Read-only views of the action and rule catalogs, plus payload checks.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use actions::{registry as action_registry, ActionDescriptor};
use engine::rules::{rule_registry, RuleDescriptor};
use schemas::ValidationResult;

use super::AppState;
use crate::error::ApiResult;

pub async fn list_actions() -> Json<&'static [ActionDescriptor]> {
    Json(action_registry())
}

pub async fn list_rules() -> Json<&'static [RuleDescriptor]> {
    Json(rule_registry())
}

pub async fn validate_config(
    Path(kind): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<ValidationResult>> {
    Ok(Json(state.engine.validate_action_config(&kind, &payload)?))
}

pub async fn validate_params(
    Path(kind): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<ValidationResult>> {
    Ok(Json(state.engine.validate_action_params(&kind, &payload)?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeRuleDto {
    pub event: String,
    pub config: Option<Value>,
}

pub async fn describe_rule(
    State(state): State<AppState>,
    Json(payload): Json<DescribeRuleDto>,
) -> ApiResult<Json<Value>> {
    let description = state
        .engine
        .render_rule_description(&payload.event, payload.config.as_ref())?;
    Ok(Json(json!({ "description": description })))
}
