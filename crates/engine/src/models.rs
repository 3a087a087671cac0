//! Result types returned by the workflow engine.
//!
//! These are what the API layer serialises: a move reports its own success
//! separately from the per-action outcomes, so a caller can say "move
//! succeeded, but 2 of 3 configured actions failed".

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use db::models::{ActionInstanceRow, PubInStageRow};

use crate::error::InvocationError;
use crate::rules::Event;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// What caused an invocation. Together with the action instance and pub it
/// forms the dedup key, so re-delivery of the same trigger is recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Entered { occupancy_id: Uuid },
    Left { occupancy_id: Uuid },
    Duration { rule_binding_id: Uuid, occupancy_id: Uuid },
    Manual { request_id: Uuid },
}

impl Trigger {
    pub fn event(&self) -> Option<Event> {
        match self {
            Self::Entered { .. } => Some(Event::PubEnteredStage),
            Self::Left { .. } => Some(Event::PubLeftStage),
            Self::Duration { .. } => Some(Event::PubInStageForDuration),
            Self::Manual { .. } => None,
        }
    }

    /// `"{action_instance_id}:{pub_id}:{trigger_id}"`.
    pub fn dedup_key(&self, action_instance_id: Uuid, pub_id: Uuid) -> String {
        format!("{action_instance_id}:{pub_id}:{self}")
    }

    /// Split a dedup key back into `(action_instance_id, pub_id, trigger)`.
    pub fn parse_dedup_key(key: &str) -> Option<(Uuid, Uuid, Self)> {
        let parts: Vec<&str> = key.split(':').collect();
        fn id(s: &str) -> Option<Uuid> {
            Uuid::parse_str(s).ok()
        }
        let (instance, pub_id, trigger) = match parts.as_slice() {
            [instance, pub_id, "entered", occupancy] => {
                (instance, pub_id, Self::Entered { occupancy_id: id(occupancy)? })
            }
            [instance, pub_id, "left", occupancy] => {
                (instance, pub_id, Self::Left { occupancy_id: id(occupancy)? })
            }
            [instance, pub_id, "duration", binding, occupancy] => (
                instance,
                pub_id,
                Self::Duration { rule_binding_id: id(binding)?, occupancy_id: id(occupancy)? },
            ),
            [instance, pub_id, "manual", request] => {
                (instance, pub_id, Self::Manual { request_id: id(request)? })
            }
            _ => return None,
        };
        Some((id(instance)?, id(pub_id)?, trigger))
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Entered { occupancy_id } => write!(f, "entered:{occupancy_id}"),
            Self::Left { occupancy_id } => write!(f, "left:{occupancy_id}"),
            Self::Duration { rule_binding_id, occupancy_id } => {
                write!(f, "duration:{rule_binding_id}:{occupancy_id}")
            }
            Self::Manual { request_id } => write!(f, "manual:{request_id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-invocation outcome
// ---------------------------------------------------------------------------

/// Why an invocation was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// The dedup key already has a successful run.
    AlreadySucceeded,
    /// Another worker holds a live claim on the dedup key.
    InProgress,
    /// Earlier attempts failed and the retry budget is spent.
    AttemptsExhausted,
    /// An earlier attempt failed in a way retrying cannot fix.
    FailedPermanently,
    /// The occupancy ended before a duration rule could fire.
    NoLongerInStage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ActionOutcome {
    Succeeded { output: Value },
    Failed { error: InvocationError },
    Skipped { reason: SkipReason },
}

impl ActionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// One action instance considered for one trigger.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationReport {
    pub action_instance_id: Uuid,
    pub action_instance_name: String,
    pub action: String,
    /// `None` for manual runs.
    pub event: Option<Event>,
    pub dedup_key: String,
    pub outcome: ActionOutcome,
}

// ---------------------------------------------------------------------------
// Move outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    pub pub_id: Uuid,
    pub from_stage_id: Option<Uuid>,
    pub to_stage_id: Uuid,
    /// The occupancy created by the move.
    pub occupancy: PubInStageRow,
    /// Invocations fired by leaving the source stage, in firing order.
    pub left: Vec<InvocationReport>,
    /// Invocations fired by entering the destination, in firing order.
    pub entered: Vec<InvocationReport>,
}

impl MoveOutcome {
    /// Every invocation, left-stage ones first.
    pub fn invocations(&self) -> impl Iterator<Item = &InvocationReport> {
        self.left.iter().chain(self.entered.iter())
    }

    /// Invocations that actually ran (succeeded or failed).
    pub fn attempted(&self) -> usize {
        self.invocations()
            .filter(|r| !matches!(r.outcome, ActionOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.invocations().filter(|r| r.outcome.is_failure()).count()
    }

    pub fn summary(&self) -> String {
        match (self.failed(), self.attempted()) {
            (_, 0) => "move succeeded".to_owned(),
            (0, n) => format!("move succeeded, {n} configured action(s) ran"),
            (failed, n) => {
                format!("move succeeded, but {failed} of {n} configured actions failed")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler work items
// ---------------------------------------------------------------------------

/// Scheduled work for one occupancy: a duration rule whose threshold has
/// elapsed, or a failed entered-stage run being retried.
#[derive(Debug, Clone)]
pub struct DueInvocation {
    pub trigger: Trigger,
    pub instance: ActionInstanceRow,
    pub occupancy: PubInStageRow,
    /// Threshold time for duration rules; time of the last failure for
    /// retries.
    pub due_at: DateTime<Utc>,
}

impl DueInvocation {
    pub fn dedup_key(&self) -> String {
        self.trigger.dedup_key(self.instance.id, self.occupancy.pub_id)
    }
}
