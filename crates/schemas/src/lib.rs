//! `schemas` crate: the schema registry.
//!
//! Maps each logical value type ([`CoreSchemaType`]) to a JSON Schema and
//! validates pub field values and action configuration/parameter payloads
//! against those schemas.

pub mod core_type;
pub mod error;
pub mod object;
pub mod validate;

pub use core_type::CoreSchemaType;
pub use error::SchemaError;
pub use object::{FieldSpec, ObjectSchema};
pub use validate::{apply_defaults, validate, ValidationIssue, ValidationResult};
