//! `actions` crate: the action registry.
//!
//! The catalog is closed: [`ActionKind`] enumerates every action the engine
//! can run, and each kind declares a configuration schema, a parameter
//! schema and a `run` function. Side effects go through the collaborator
//! capabilities in [`traits`], bundled as [`Services`].

pub mod context;
pub mod error;
pub mod http_client;
pub mod kind;
pub mod kinds;
pub mod mock;
pub mod services;
pub mod template;
pub mod traits;

pub use context::ActionContext;
pub use error::{ActionError, UnknownActionKind};
pub use kind::{registry, ActionDescriptor, ActionKind};
pub use services::{Integrations, Services};
pub use traits::{Exporter, HttpClient, Notifier, PubMover};
