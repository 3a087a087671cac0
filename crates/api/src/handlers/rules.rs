use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use db::models::RuleBindingRow;

use super::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleBindingDto {
    pub event: String,
    pub additional_config: Option<Value>,
}

pub async fn create(
    Path(action_instance_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<CreateRuleBindingDto>,
) -> ApiResult<(StatusCode, Json<RuleBindingRow>)> {
    let binding = state
        .engine
        .create_rule_binding(action_instance_id, &payload.event, payload.additional_config)
        .await?;
    Ok((StatusCode::CREATED, Json(binding)))
}

pub async fn list_for_instance(
    Path(action_instance_id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<RuleBindingRow>>> {
    Ok(Json(
        state
            .engine
            .list_rule_bindings_for_instance(action_instance_id)
            .await?,
    ))
}

pub async fn delete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<StatusCode> {
    if state.engine.delete_rule_binding(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("rule binding {id} not found")))
    }
}

pub async fn describe(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let description = state.engine.describe_rule_binding(id).await?;
    Ok(Json(json!({ "description": description })))
}
