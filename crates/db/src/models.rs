//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models: they carry no domain behaviour.
//! Action and event kinds are stored as their wire names (`String`); the
//! engine parses them into its closed enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// stages / move_constraints
// ---------------------------------------------------------------------------

/// A named step within a community's workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StageRow {
    pub id: Uuid,
    pub community_id: Uuid,
    pub name: String,
    /// Lexicographic display key; see `engine::ordering`.
    pub order_key: String,
    pub created_at: DateTime<Utc>,
}

/// Directed edge: a pub in `stage_id` may move to `destination_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct MoveConstraintRow {
    pub stage_id: Uuid,
    pub destination_id: Uuid,
}

// ---------------------------------------------------------------------------
// pub_types / pubs / pubs_in_stages
// ---------------------------------------------------------------------------

/// A pub type. `fields` is a JSON object mapping field slug to core schema
/// type name (e.g. `{"title": "String"}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PubTypeRow {
    pub id: Uuid,
    pub community_id: Uuid,
    pub name: String,
    pub fields: serde_json::Value,
}

/// A content unit. `values` is a JSON object keyed by field slug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PubRow {
    pub id: Uuid,
    pub community_id: Uuid,
    pub pub_type_id: Uuid,
    #[sqlx(rename = "field_values")]
    pub values: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One occupancy of a stage by a pub. A fresh `id` is minted on every entry,
/// so re-entering the same stage is a distinct occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PubInStageRow {
    pub id: Uuid,
    pub pub_id: Uuid,
    pub stage_id: Uuid,
    pub entered_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// action_instances / rule_bindings
// ---------------------------------------------------------------------------

/// A configured action bound to a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ActionInstanceRow {
    pub id: Uuid,
    pub community_id: Uuid,
    pub stage_id: Uuid,
    /// Action kind wire name, e.g. `"email"`.
    pub action: String,
    pub name: String,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// "When `event` happens, run `action_instance_id`."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RuleBindingRow {
    pub id: Uuid,
    /// Event wire name, e.g. `"pubEnteredStage"`.
    pub event: String,
    pub action_instance_id: Uuid,
    pub additional_config: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// action_runs / action_run_claims
// ---------------------------------------------------------------------------

/// Append-only audit record of one action invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ActionRunRow {
    pub id: Uuid,
    pub action_instance_id: Uuid,
    pub pub_id: Uuid,
    /// Triggering event wire name; `None` for manual runs.
    pub event: Option<String>,
    pub dedup_key: String,
    pub success: bool,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub params: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of an invocation claim.
///
/// Transitions: `Claimed → Succeeded | Failed | Abandoned`, `Failed → Claimed`
/// (retry). `Abandoned` is terminal: the failure cannot be fixed by retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimStatus {
    Claimed,
    Succeeded,
    Failed,
    Abandoned,
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Claimed   => write!(f, "claimed"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed    => write!(f, "failed"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

impl std::str::FromStr for ClaimStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claimed"   => Ok(Self::Claimed),
            "succeeded" => Ok(Self::Succeeded),
            "failed"    => Ok(Self::Failed),
            "abandoned" => Ok(Self::Abandoned),
            other       => Err(format!("unknown claim status: {other}")),
        }
    }
}

/// Dedup-key claim row guarding exactly-once execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ActionRunClaimRow {
    pub dedup_key: String,
    pub status: String,
    pub attempts: i32,
    pub claimed_at: DateTime<Utc>,
}

impl ActionRunClaimRow {
    pub fn status(&self) -> Option<ClaimStatus> {
        self.status.parse().ok()
    }
}
