//! Action instance operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::ActionInstanceRow};

const COLUMNS: &str = "id, community_id, stage_id, action, name, config, created_at, updated_at";

pub async fn insert_action_instance(
    pool: &PgPool,
    instance: &ActionInstanceRow,
) -> Result<ActionInstanceRow, DbError> {
    let row = sqlx::query_as::<_, ActionInstanceRow>(&format!(
        "INSERT INTO action_instances ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {COLUMNS}"
    ))
    .bind(instance.id)
    .bind(instance.community_id)
    .bind(instance.stage_id)
    .bind(&instance.action)
    .bind(&instance.name)
    .bind(&instance.config)
    .bind(instance.created_at)
    .bind(instance.updated_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_action_instance(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<ActionInstanceRow>, DbError> {
    let row = sqlx::query_as::<_, ActionInstanceRow>(&format!(
        "SELECT {COLUMNS} FROM action_instances WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns `DbError::NotFound` if no row was updated.
pub async fn update_action_instance_config(
    pool: &PgPool,
    id: Uuid,
    config: &serde_json::Value,
    updated_at: DateTime<Utc>,
) -> Result<ActionInstanceRow, DbError> {
    sqlx::query_as::<_, ActionInstanceRow>(&format!(
        "UPDATE action_instances SET config = $1, updated_at = $2 WHERE id = $3 RETURNING {COLUMNS}"
    ))
    .bind(config)
    .bind(updated_at)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

pub async fn delete_action_instance(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM action_instances WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn get_action_instances_for_stage(
    pool: &PgPool,
    stage_id: Uuid,
) -> Result<Vec<ActionInstanceRow>, DbError> {
    let rows = sqlx::query_as::<_, ActionInstanceRow>(&format!(
        "SELECT {COLUMNS} FROM action_instances WHERE stage_id = $1 ORDER BY created_at ASC, id ASC"
    ))
    .bind(stage_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn list_action_instances(
    pool: &PgPool,
    community_id: Uuid,
) -> Result<Vec<ActionInstanceRow>, DbError> {
    let rows = sqlx::query_as::<_, ActionInstanceRow>(&format!(
        "SELECT {COLUMNS} FROM action_instances WHERE community_id = $1 ORDER BY created_at ASC, id ASC"
    ))
    .bind(community_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
