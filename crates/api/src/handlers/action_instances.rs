use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use db::models::ActionInstanceRow;
use engine::InvocationReport;

use super::AppState;
use crate::error::ApiResult;

#[derive(Deserialize)]
pub struct CreateActionInstanceDto {
    pub action: String,
    pub name: String,
    #[serde(default)]
    pub config: Value,
}

pub async fn create(
    Path(stage_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<CreateActionInstanceDto>,
) -> ApiResult<(StatusCode, Json<ActionInstanceRow>)> {
    let instance = state
        .engine
        .create_action_instance(stage_id, &payload.action, &payload.name, payload.config)
        .await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

pub async fn list(
    Path(community_id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ActionInstanceRow>>> {
    Ok(Json(state.engine.list_action_instances(community_id).await?))
}

pub async fn update_config(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(config): Json<Value>,
) -> ApiResult<Json<ActionInstanceRow>> {
    Ok(Json(state.engine.update_action_instance_config(id, config).await?))
}

pub async fn delete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let removed = state.engine.delete_action_instance(id).await?;
    Ok(Json(json!({ "deleted": id, "ruleBindingsRemoved": removed })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunActionDto {
    pub pub_id: Uuid,
    #[serde(default)]
    pub params: Value,
}

/// Run an action instance for one pub right now.
pub async fn run(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<RunActionDto>,
) -> ApiResult<Json<InvocationReport>> {
    let report = state
        .engine
        .run_action_manually(id, payload.pub_id, payload.params)
        .await?;
    Ok(Json(report))
}
