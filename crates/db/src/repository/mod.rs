//! Repository functions: one function per database operation.
//!
//! Every function takes a `&PgPool` and returns a `Result<T, DbError>`.
//! No business logic, no domain types: pure SQL.

pub mod action_instances;
pub mod occupancy;
pub mod pubs;
pub mod rule_bindings;
pub mod runs;
pub mod stages;

use crate::DbError;

/// Map a Postgres unique violation (`23505`) onto [`DbError::Conflict`].
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: impl FnOnce() -> String) -> DbError {
    let unique = err
        .as_database_error()
        .and_then(|d| d.code())
        .is_some_and(|code| code == "23505");
    if unique {
        DbError::Conflict(what())
    } else {
        DbError::Sqlx(err)
    }
}
