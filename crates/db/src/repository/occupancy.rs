//! `pubs_in_stages` operations.
//!
//! The move path uses [`replace_pub_in_stage`], which performs the
//! delete/insert pair inside one transaction.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::PubInStageRow};

use super::conflict_on_unique;

const COLUMNS: &str = "id, pub_id, stage_id, entered_at";

pub async fn list_pub_stages(pool: &PgPool, pub_id: Uuid) -> Result<Vec<PubInStageRow>, DbError> {
    let rows = sqlx::query_as::<_, PubInStageRow>(&format!(
        "SELECT {COLUMNS} FROM pubs_in_stages WHERE pub_id = $1 ORDER BY entered_at ASC"
    ))
    .bind(pub_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn list_stage_occupants(
    pool: &PgPool,
    stage_id: Uuid,
) -> Result<Vec<PubInStageRow>, DbError> {
    let rows = sqlx::query_as::<_, PubInStageRow>(&format!(
        "SELECT {COLUMNS} FROM pubs_in_stages WHERE stage_id = $1 ORDER BY entered_at ASC"
    ))
    .bind(stage_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn get_pub_in_stage(pool: &PgPool, id: Uuid) -> Result<Option<PubInStageRow>, DbError> {
    let row = sqlx::query_as::<_, PubInStageRow>(&format!(
        "SELECT {COLUMNS} FROM pubs_in_stages WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn insert_pub_in_stage(
    pool: &PgPool,
    row: &PubInStageRow,
) -> Result<PubInStageRow, DbError> {
    let inserted = sqlx::query_as::<_, PubInStageRow>(&format!(
        "INSERT INTO pubs_in_stages ({COLUMNS}) VALUES ($1, $2, $3, $4) RETURNING {COLUMNS}"
    ))
    .bind(row.id)
    .bind(row.pub_id)
    .bind(row.stage_id)
    .bind(row.entered_at)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        conflict_on_unique(e, || format!("pub {} already in stage {}", row.pub_id, row.stage_id))
    })?;

    Ok(inserted)
}

pub async fn delete_pub_in_stage(
    pool: &PgPool,
    pub_id: Uuid,
    stage_id: Uuid,
) -> Result<Option<PubInStageRow>, DbError> {
    let removed = sqlx::query_as::<_, PubInStageRow>(&format!(
        "DELETE FROM pubs_in_stages WHERE pub_id = $1 AND stage_id = $2 RETURNING {COLUMNS}"
    ))
    .bind(pub_id)
    .bind(stage_id)
    .fetch_optional(pool)
    .await?;

    Ok(removed)
}

/// Delete `(row.pub_id, from_stage_id)` and insert `row` in one transaction.
///
/// Dropping the transaction on any error rolls both statements back.
pub async fn replace_pub_in_stage(
    pool: &PgPool,
    from_stage_id: Option<Uuid>,
    row: &PubInStageRow,
) -> Result<Option<PubInStageRow>, DbError> {
    let mut tx = pool.begin().await?;

    let removed = match from_stage_id {
        Some(from) => {
            let removed = sqlx::query_as::<_, PubInStageRow>(&format!(
                "DELETE FROM pubs_in_stages WHERE pub_id = $1 AND stage_id = $2 RETURNING {COLUMNS}"
            ))
            .bind(row.pub_id)
            .bind(from)
            .fetch_optional(&mut *tx)
            .await?;

            match removed {
                Some(r) => Some(r),
                None => {
                    tx.rollback().await?;
                    return Err(DbError::NotFound);
                }
            }
        }
        None => None,
    };

    sqlx::query(&format!(
        "INSERT INTO pubs_in_stages ({COLUMNS}) VALUES ($1, $2, $3, $4)"
    ))
    .bind(row.id)
    .bind(row.pub_id)
    .bind(row.stage_id)
    .bind(row.entered_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        conflict_on_unique(e, || format!("pub {} already in stage {}", row.pub_id, row.stage_id))
    })?;

    tx.commit().await?;
    Ok(removed)
}
