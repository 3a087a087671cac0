//! Schema-level error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    /// The schema document itself could not be compiled.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// A string did not name any known core schema type.
    #[error("unknown core schema type: '{0}'")]
    UnknownCoreType(String),
}
