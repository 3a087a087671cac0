//! Pub type and pub operations.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    DbError,
    models::{PubRow, PubTypeRow},
};

use super::conflict_on_unique;

pub async fn insert_pub_type(pool: &PgPool, pub_type: &PubTypeRow) -> Result<PubTypeRow, DbError> {
    let row = sqlx::query_as::<_, PubTypeRow>(
        r#"
        INSERT INTO pub_types (id, community_id, name, fields)
        VALUES ($1, $2, $3, $4)
        RETURNING id, community_id, name, fields
        "#,
    )
    .bind(pub_type.id)
    .bind(pub_type.community_id)
    .bind(&pub_type.name)
    .bind(&pub_type.fields)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_pub_type(pool: &PgPool, id: Uuid) -> Result<Option<PubTypeRow>, DbError> {
    let row = sqlx::query_as::<_, PubTypeRow>(
        "SELECT id, community_id, name, fields FROM pub_types WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn insert_pub(pool: &PgPool, pub_row: &PubRow) -> Result<PubRow, DbError> {
    let row = sqlx::query_as::<_, PubRow>(
        r#"
        INSERT INTO pubs (id, community_id, pub_type_id, field_values, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, community_id, pub_type_id, field_values, created_at
        "#,
    )
    .bind(pub_row.id)
    .bind(pub_row.community_id)
    .bind(pub_row.pub_type_id)
    .bind(&pub_row.values)
    .bind(pub_row.created_at)
    .fetch_one(pool)
    .await
    .map_err(|e| conflict_on_unique(e, || format!("pub {} already exists", pub_row.id)))?;

    Ok(row)
}

pub async fn get_pub(pool: &PgPool, id: Uuid) -> Result<Option<PubRow>, DbError> {
    let row = sqlx::query_as::<_, PubRow>(
        "SELECT id, community_id, pub_type_id, field_values, created_at FROM pubs WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
