//! Invocation claims and the `action_runs` audit log.
//!
//! Claims are taken with a conditional `INSERT … ON CONFLICT DO UPDATE … WHERE`
//! so that racing schedulers get exactly one winner per dedup key.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    DbError,
    models::{ActionRunClaimRow, ActionRunRow, ClaimStatus},
    store::ClaimRequest,
};

const RUN_COLUMNS: &str =
    "id, action_instance_id, pub_id, event, dedup_key, success, output, error, params, created_at";

/// Returns `true` if this caller now holds the claim.
pub async fn claim_run(pool: &PgPool, request: &ClaimRequest) -> Result<bool, DbError> {
    let claimed: Option<String> = sqlx::query_scalar(
        r#"
        INSERT INTO action_run_claims (dedup_key, status, attempts, claimed_at)
        VALUES ($1, 'claimed', 1, $2)
        ON CONFLICT (dedup_key) DO UPDATE
        SET status = 'claimed',
            attempts = action_run_claims.attempts + 1,
            claimed_at = EXCLUDED.claimed_at
        WHERE action_run_claims.attempts < $3
          AND (action_run_claims.status = 'failed'
               OR (action_run_claims.status = 'claimed' AND action_run_claims.claimed_at < $4))
        RETURNING dedup_key
        "#,
    )
    .bind(&request.dedup_key)
    .bind(request.now)
    .bind(request.max_attempts)
    .bind(request.stale_before)
    .fetch_optional(pool)
    .await?;

    Ok(claimed.is_some())
}

pub async fn finish_claim(
    pool: &PgPool,
    dedup_key: &str,
    status: ClaimStatus,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE action_run_claims SET status = $1, claimed_at = $2 WHERE dedup_key = $3",
    )
    .bind(status.to_string())
    .bind(now)
    .bind(dedup_key)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

pub async fn list_retryable_claims(
    pool: &PgPool,
    max_attempts: i32,
) -> Result<Vec<ActionRunClaimRow>, DbError> {
    let rows = sqlx::query_as::<_, ActionRunClaimRow>(
        r#"
        SELECT dedup_key, status, attempts, claimed_at
        FROM action_run_claims
        WHERE status = 'failed' AND attempts < $1
        ORDER BY claimed_at ASC, dedup_key ASC
        "#,
    )
    .bind(max_attempts)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn get_claim(pool: &PgPool, dedup_key: &str) -> Result<Option<ActionRunClaimRow>, DbError> {
    let row = sqlx::query_as::<_, ActionRunClaimRow>(
        "SELECT dedup_key, status, attempts, claimed_at FROM action_run_claims WHERE dedup_key = $1",
    )
    .bind(dedup_key)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Append one run record. Rows are never updated afterwards.
pub async fn insert_action_run(pool: &PgPool, run: &ActionRunRow) -> Result<ActionRunRow, DbError> {
    let row = sqlx::query_as::<_, ActionRunRow>(&format!(
        "INSERT INTO action_runs ({RUN_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {RUN_COLUMNS}"
    ))
    .bind(run.id)
    .bind(run.action_instance_id)
    .bind(run.pub_id)
    .bind(&run.event)
    .bind(&run.dedup_key)
    .bind(run.success)
    .bind(&run.output)
    .bind(&run.error)
    .bind(&run.params)
    .bind(run.created_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn list_action_runs(pool: &PgPool, pub_id: Uuid) -> Result<Vec<ActionRunRow>, DbError> {
    let rows = sqlx::query_as::<_, ActionRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM action_runs WHERE pub_id = $1 ORDER BY created_at ASC, id ASC"
    ))
    .bind(pub_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn has_successful_run(pool: &PgPool, dedup_key: &str) -> Result<bool, DbError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM action_runs WHERE dedup_key = $1 AND success)",
    )
    .bind(dedup_key)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}
