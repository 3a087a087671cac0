//! Request handlers, grouped by resource.

use std::sync::Arc;

use engine::WorkflowEngine;

pub mod action_instances;
pub mod pubs;
pub mod registry;
pub mod rules;
pub mod stages;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
}
