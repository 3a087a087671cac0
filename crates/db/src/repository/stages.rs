//! Stage and move-constraint operations.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    DbError,
    models::{MoveConstraintRow, StageRow},
};

/// Insert a new stage.
pub async fn insert_stage(pool: &PgPool, stage: &StageRow) -> Result<StageRow, DbError> {
    let row = sqlx::query_as::<_, StageRow>(
        r#"
        INSERT INTO stages (id, community_id, name, order_key, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, community_id, name, order_key, created_at
        "#,
    )
    .bind(stage.id)
    .bind(stage.community_id)
    .bind(&stage.name)
    .bind(&stage.order_key)
    .bind(stage.created_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_stage(pool: &PgPool, id: Uuid) -> Result<Option<StageRow>, DbError> {
    let row = sqlx::query_as::<_, StageRow>(
        r#"SELECT id, community_id, name, order_key, created_at FROM stages WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// All stages of a community in display order.
pub async fn list_stages(pool: &PgPool, community_id: Uuid) -> Result<Vec<StageRow>, DbError> {
    let rows = sqlx::query_as::<_, StageRow>(
        r#"
        SELECT id, community_id, name, order_key, created_at
        FROM stages
        WHERE community_id = $1
        ORDER BY order_key ASC, id ASC
        "#,
    )
    .bind(community_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns `DbError::NotFound` if no row was updated.
pub async fn update_stage_order(pool: &PgPool, id: Uuid, order_key: &str) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE stages SET order_key = $1 WHERE id = $2")
        .bind(order_key)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Delete a stage; `ON DELETE CASCADE` removes its edges and occupancies.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_stage(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM stages WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Returns `false` if the edge already existed.
pub async fn insert_move_constraint(pool: &PgPool, edge: MoveConstraintRow) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        INSERT INTO move_constraints (stage_id, destination_id)
        VALUES ($1, $2)
        ON CONFLICT (stage_id, destination_id) DO NOTHING
        "#,
    )
    .bind(edge.stage_id)
    .bind(edge.destination_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn delete_move_constraint(
    pool: &PgPool,
    stage_id: Uuid,
    destination_id: Uuid,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "DELETE FROM move_constraints WHERE stage_id = $1 AND destination_id = $2",
    )
    .bind(stage_id)
    .bind(destination_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn get_move_constraints(
    pool: &PgPool,
    stage_id: Uuid,
) -> Result<Vec<MoveConstraintRow>, DbError> {
    let rows = sqlx::query_as::<_, MoveConstraintRow>(
        "SELECT stage_id, destination_id FROM move_constraints WHERE stage_id = $1",
    )
    .bind(stage_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn list_move_constraints(
    pool: &PgPool,
    community_id: Uuid,
) -> Result<Vec<MoveConstraintRow>, DbError> {
    let rows = sqlx::query_as::<_, MoveConstraintRow>(
        r#"
        SELECT mc.stage_id, mc.destination_id
        FROM move_constraints mc
        JOIN stages s ON s.id = mc.stage_id
        WHERE s.community_id = $1
        "#,
    )
    .bind(community_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
