//! `engine` crate: stage graph, rule catalog and the workflow engine.

pub mod admin;
pub mod clock;
pub mod config;
pub mod error;
mod executor;
pub mod locks;
pub mod models;
mod mover;
pub mod ordering;
pub mod rules;
pub mod stage_graph;
pub mod workflow;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{EngineError, InvocationError};
pub use models::{ActionOutcome, DueInvocation, InvocationReport, MoveOutcome, SkipReason, Trigger};
pub use ordering::order_between;
pub use rules::{describe_binding, DurationConfig, DurationInterval, Event, RuleDescriptor};
pub use stage_graph::StageGraph;
pub use workflow::WorkflowEngine;

#[cfg(test)]
mod engine_tests;
