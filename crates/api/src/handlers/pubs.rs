use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use db::models::{ActionRunRow, PubRow, PubTypeRow};
use engine::MoveOutcome;
use schemas::CoreSchemaType;

use super::AppState;
use crate::error::ApiResult;

#[derive(Deserialize)]
pub struct CreatePubTypeDto {
    pub name: String,
    pub fields: BTreeMap<String, CoreSchemaType>,
}

pub async fn create_pub_type(
    Path(community_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<CreatePubTypeDto>,
) -> ApiResult<(StatusCode, Json<PubTypeRow>)> {
    let pub_type = state
        .engine
        .create_pub_type(community_id, &payload.name, payload.fields)
        .await?;
    Ok((StatusCode::CREATED, Json(pub_type)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePubDto {
    pub pub_type_id: Uuid,
    #[serde(default)]
    pub values: Value,
}

pub async fn create_pub(
    Path(community_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<CreatePubDto>,
) -> ApiResult<(StatusCode, Json<PubRow>)> {
    let pub_row = state
        .engine
        .create_pub(community_id, payload.pub_type_id, payload.values)
        .await?;
    Ok((StatusCode::CREATED, Json(pub_row)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePubDto {
    pub from_stage_id: Option<Uuid>,
    pub to_stage_id: Uuid,
}

#[derive(Serialize)]
pub struct MoveResponse {
    pub summary: String,
    #[serde(flatten)]
    pub outcome: MoveOutcome,
}

/// Move a pub. Returns 200 whenever the move itself happened, even if some
/// of the actions it triggered failed; see `summary` and the per-action
/// outcomes.
pub async fn move_pub(
    Path(pub_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<MovePubDto>,
) -> ApiResult<Json<MoveResponse>> {
    let outcome = state
        .engine
        .move_pub(pub_id, payload.from_stage_id, payload.to_stage_id)
        .await?;
    Ok(Json(MoveResponse { summary: outcome.summary(), outcome }))
}

pub async fn list_runs(
    Path(pub_id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ActionRunRow>>> {
    Ok(Json(state.engine.list_action_runs(pub_id).await?))
}
