//! Rule binding operations.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::RuleBindingRow};

const COLUMNS: &str = "id, event, action_instance_id, additional_config, created_at";

pub async fn insert_rule_binding(
    pool: &PgPool,
    binding: &RuleBindingRow,
) -> Result<RuleBindingRow, DbError> {
    let row = sqlx::query_as::<_, RuleBindingRow>(&format!(
        "INSERT INTO rule_bindings ({COLUMNS}) VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
    ))
    .bind(binding.id)
    .bind(&binding.event)
    .bind(binding.action_instance_id)
    .bind(&binding.additional_config)
    .bind(binding.created_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_rule_binding(pool: &PgPool, id: Uuid) -> Result<Option<RuleBindingRow>, DbError> {
    let row = sqlx::query_as::<_, RuleBindingRow>(&format!(
        "SELECT {COLUMNS} FROM rule_bindings WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn delete_rule_binding(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM rule_bindings WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_rule_bindings_for_instance(
    pool: &PgPool,
    action_instance_id: Uuid,
) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM rule_bindings WHERE action_instance_id = $1")
        .bind(action_instance_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

pub async fn get_rule_bindings_for_event(
    pool: &PgPool,
    event: &str,
    action_instance_id: Uuid,
) -> Result<Vec<RuleBindingRow>, DbError> {
    let rows = sqlx::query_as::<_, RuleBindingRow>(&format!(
        "SELECT {COLUMNS} FROM rule_bindings WHERE event = $1 AND action_instance_id = $2 ORDER BY created_at ASC"
    ))
    .bind(event)
    .bind(action_instance_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn list_rule_bindings_by_event(
    pool: &PgPool,
    event: &str,
) -> Result<Vec<RuleBindingRow>, DbError> {
    let rows = sqlx::query_as::<_, RuleBindingRow>(&format!(
        "SELECT {COLUMNS} FROM rule_bindings WHERE event = $1 ORDER BY created_at ASC"
    ))
    .bind(event)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn list_rule_bindings_for_instance(
    pool: &PgPool,
    action_instance_id: Uuid,
) -> Result<Vec<RuleBindingRow>, DbError> {
    let rows = sqlx::query_as::<_, RuleBindingRow>(&format!(
        "SELECT {COLUMNS} FROM rule_bindings WHERE action_instance_id = $1 ORDER BY created_at ASC"
    ))
    .bind(action_instance_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
