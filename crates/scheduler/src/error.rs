use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scan itself failed; individual invocation failures are counted
    /// in the tick summary instead.
    #[error("duration scan failed: {0}")]
    Engine(#[from] engine::EngineError),
}
