//! `db` crate: pure persistence layer.
//!
//! Provides typed row structs, the [`Store`] capability the engine consumes,
//! an in-memory implementation for tests and demos, and a Postgres
//! implementation built on repository functions (one per SQL operation).
//! No business logic lives here.

pub mod error;
pub mod memory;
pub mod models;
pub mod pool;
pub mod postgres;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use memory::MemoryStore;
pub use pool::DbPool;
pub use postgres::PgStore;
pub use store::{ClaimRequest, Store};
