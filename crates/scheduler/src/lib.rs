//! `scheduler` crate: the duration watcher.
//!
//! "Pub has been in stage for at least T" is not a discrete event, so it is
//! re-evaluated on an interval. Any number of watchers may run against the
//! same database; the engine's claim step makes each due occupancy fire once.
//! Each pass also retries failed entered-stage runs whose occupancy is still
//! current.

pub mod config;
pub mod error;
pub mod watcher;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use watcher::{DurationWatcher, TickSummary};
