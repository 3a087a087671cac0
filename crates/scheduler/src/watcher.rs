//! Periodic scan for elapsed `pubInStageForDuration` rules and retryable
//! entered-stage runs.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use engine::{ActionOutcome, InvocationReport, WorkflowEngine};

use crate::{SchedulerConfig, SchedulerError};

/// Counts for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub due: usize,
    /// Of `due`, how many were failed entered-stage runs being retried.
    pub retries: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Claimed elsewhere, already done, or the pub left in the meantime.
    pub skipped: usize,
    /// Invocations that could not be attempted (storage errors, panics).
    pub errors: usize,
}

impl TickSummary {
    fn count(&mut self, report: &InvocationReport) {
        match report.outcome {
            ActionOutcome::Succeeded { .. } => self.succeeded += 1,
            ActionOutcome::Failed { .. } => self.failed += 1,
            ActionOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

pub struct DurationWatcher {
    engine: Arc<WorkflowEngine>,
    config: SchedulerConfig,
}

impl DurationWatcher {
    pub fn new(engine: Arc<WorkflowEngine>, config: SchedulerConfig) -> Self {
        Self { engine, config }
    }

    /// Scan once and fire every due rule and retry, at most
    /// `max_concurrency` at a time.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<TickSummary, SchedulerError> {
        let mut due = self.engine.due_duration_invocations().await?;
        let retries = self.engine.retryable_entered_invocations().await?;
        let mut summary = TickSummary {
            due: due.len() + retries.len(),
            retries: retries.len(),
            ..TickSummary::default()
        };
        due.extend(retries);
        if due.is_empty() {
            debug!("nothing due");
            return Ok(summary);
        }

        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for item in due {
            let engine = self.engine.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                engine.fire_due(item).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(report)) => summary.count(&report),
                Ok(Err(e)) => {
                    warn!(error = %e, "duration invocation could not be attempted");
                    summary.errors += 1;
                }
                Err(e) => {
                    error!(error = %e, "duration invocation task panicked");
                    summary.errors += 1;
                }
            }
        }

        info!(
            due = summary.due,
            retries = summary.retries,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            errors = summary.errors,
            "duration scan finished"
        );
        Ok(summary)
    }

    /// Scan every `interval` until `shutdown` resolves. A failed scan is
    /// logged and retried on the next tick.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(interval = ?self.config.interval, "duration watcher started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "duration scan failed");
                    }
                }
            }
        }
        info!("duration watcher stopped");
    }
}
