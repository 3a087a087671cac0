use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use db::models::StageRow;

use super::AppState;
use crate::error::ApiResult;

#[derive(Deserialize)]
pub struct CreateStageDto {
    pub name: String,
}

pub async fn list(
    Path(community_id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<StageRow>>> {
    Ok(Json(state.engine.list_stages(community_id).await?))
}

pub async fn create(
    Path(community_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<CreateStageDto>,
) -> ApiResult<(StatusCode, Json<StageRow>)> {
    let stage = state.engine.create_stage(community_id, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(stage)))
}

#[derive(Deserialize)]
pub struct ReorderStageDto {
    /// Place the stage right after this one; `null` moves it to the front.
    pub after: Option<Uuid>,
}

pub async fn reorder(
    Path(stage_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<ReorderStageDto>,
) -> ApiResult<Json<StageRow>> {
    Ok(Json(state.engine.reorder_stage(stage_id, payload.after).await?))
}

pub async fn delete(
    Path(stage_id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<StatusCode> {
    state.engine.delete_stage(stage_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn destinations(
    Path(stage_id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Uuid>>> {
    let destinations = state.engine.destinations_of(stage_id).await?;
    Ok(Json(destinations.into_iter().collect()))
}

pub async fn reachable(
    Path(stage_id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Uuid>>> {
    Ok(Json(state.engine.reachable_from(stage_id).await?))
}

pub async fn add_constraint(
    Path((stage_id, destination_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let created = state.engine.add_constraint(stage_id, destination_id).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(json!({ "stageId": stage_id, "destinationId": destination_id }))))
}

pub async fn remove_constraint(
    Path((stage_id, destination_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> ApiResult<StatusCode> {
    if state.engine.remove_constraint(stage_id, destination_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}
