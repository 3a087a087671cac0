//! The persistence capability consumed by the engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    ActionInstanceRow, ActionRunClaimRow, ActionRunRow, ClaimStatus, MoveConstraintRow,
    PubInStageRow, PubRow, PubTypeRow, RuleBindingRow, StageRow,
};
use crate::DbError;

/// Parameters for [`Store::claim_run`].
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub dedup_key: String,
    pub now: DateTime<Utc>,
    /// A `claimed` row older than this is considered abandoned.
    pub stale_before: DateTime<Utc>,
    /// A failed key is not re-claimed once it reached this many attempts.
    pub max_attempts: i32,
}

/// Storage backend for stages, pubs, configured actions and the run log.
///
/// ## Atomicity
///
/// - [`Store::replace_pub_in_stage`] deletes the old occupancy and inserts
///   the new one as one unit: either both happen or neither does.
/// - [`Store::claim_run`] is a conditional upsert: of any number of racing
///   callers for the same dedup key, at most one gets `true`.
///
/// ## Cascades
///
/// Deleting a stage removes its move constraints (either endpoint) and
/// occupancies. Deleting an action instance does **not** remove its rule
/// bindings; callers clean those up separately.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // ── Stages ────────────────────────────────────────────────────────────

    async fn insert_stage(&self, stage: StageRow) -> Result<StageRow, DbError>;

    async fn get_stage(&self, id: Uuid) -> Result<Option<StageRow>, DbError>;

    /// All stages of a community ordered by `order_key`.
    async fn list_stages(&self, community_id: Uuid) -> Result<Vec<StageRow>, DbError>;

    /// Returns `DbError::NotFound` if the stage does not exist.
    async fn update_stage_order(&self, id: Uuid, order_key: &str) -> Result<(), DbError>;

    /// Returns `DbError::NotFound` if the stage does not exist.
    async fn delete_stage(&self, id: Uuid) -> Result<(), DbError>;

    // ── Move constraints ──────────────────────────────────────────────────

    /// Returns `false` if the edge already existed.
    async fn insert_move_constraint(&self, edge: MoveConstraintRow) -> Result<bool, DbError>;

    /// Returns `false` if no such edge existed.
    async fn delete_move_constraint(
        &self,
        stage_id: Uuid,
        destination_id: Uuid,
    ) -> Result<bool, DbError>;

    /// Outgoing edges of one stage.
    async fn get_move_constraints(&self, stage_id: Uuid) -> Result<Vec<MoveConstraintRow>, DbError>;

    /// Every edge whose source stage belongs to the community.
    async fn list_move_constraints(
        &self,
        community_id: Uuid,
    ) -> Result<Vec<MoveConstraintRow>, DbError>;

    // ── Pub types and pubs ────────────────────────────────────────────────

    async fn insert_pub_type(&self, pub_type: PubTypeRow) -> Result<PubTypeRow, DbError>;

    async fn get_pub_type(&self, id: Uuid) -> Result<Option<PubTypeRow>, DbError>;

    async fn insert_pub(&self, pub_row: PubRow) -> Result<PubRow, DbError>;

    async fn get_pub(&self, id: Uuid) -> Result<Option<PubRow>, DbError>;

    // ── Occupancy (pubs in stages) ────────────────────────────────────────

    async fn list_pub_stages(&self, pub_id: Uuid) -> Result<Vec<PubInStageRow>, DbError>;

    async fn list_stage_occupants(&self, stage_id: Uuid) -> Result<Vec<PubInStageRow>, DbError>;

    async fn get_pub_in_stage(&self, id: Uuid) -> Result<Option<PubInStageRow>, DbError>;

    /// Returns `DbError::Conflict` if the pub already occupies the stage.
    async fn insert_pub_in_stage(&self, row: PubInStageRow) -> Result<PubInStageRow, DbError>;

    /// Returns the removed row, if any.
    async fn delete_pub_in_stage(
        &self,
        pub_id: Uuid,
        stage_id: Uuid,
    ) -> Result<Option<PubInStageRow>, DbError>;

    /// Atomically remove `(row.pub_id, from_stage_id)` (when given) and insert
    /// `row`. Returns the removed row.
    ///
    /// # Errors
    /// - `DbError::NotFound` if `from_stage_id` is given but not occupied.
    /// - `DbError::Conflict` if the pub already occupies `row.stage_id` and
    ///   that occupancy is not the one being removed.
    async fn replace_pub_in_stage(
        &self,
        from_stage_id: Option<Uuid>,
        row: PubInStageRow,
    ) -> Result<Option<PubInStageRow>, DbError>;

    // ── Action instances ──────────────────────────────────────────────────

    async fn insert_action_instance(
        &self,
        instance: ActionInstanceRow,
    ) -> Result<ActionInstanceRow, DbError>;

    async fn get_action_instance(&self, id: Uuid) -> Result<Option<ActionInstanceRow>, DbError>;

    /// Returns `DbError::NotFound` if the instance does not exist.
    async fn update_action_instance_config(
        &self,
        id: Uuid,
        config: serde_json::Value,
        updated_at: DateTime<Utc>,
    ) -> Result<ActionInstanceRow, DbError>;

    /// Returns `false` if no such instance existed.
    async fn delete_action_instance(&self, id: Uuid) -> Result<bool, DbError>;

    async fn get_action_instances_for_stage(
        &self,
        stage_id: Uuid,
    ) -> Result<Vec<ActionInstanceRow>, DbError>;

    async fn list_action_instances(
        &self,
        community_id: Uuid,
    ) -> Result<Vec<ActionInstanceRow>, DbError>;

    // ── Rule bindings ─────────────────────────────────────────────────────

    async fn insert_rule_binding(&self, binding: RuleBindingRow) -> Result<RuleBindingRow, DbError>;

    async fn get_rule_binding(&self, id: Uuid) -> Result<Option<RuleBindingRow>, DbError>;

    /// Returns `false` if no such binding existed.
    async fn delete_rule_binding(&self, id: Uuid) -> Result<bool, DbError>;

    /// Returns the number of bindings removed.
    async fn delete_rule_bindings_for_instance(&self, action_instance_id: Uuid)
        -> Result<u64, DbError>;

    async fn get_rule_bindings_for_event(
        &self,
        event: &str,
        action_instance_id: Uuid,
    ) -> Result<Vec<RuleBindingRow>, DbError>;

    /// Every binding for `event`, across all communities.
    async fn list_rule_bindings_by_event(&self, event: &str) -> Result<Vec<RuleBindingRow>, DbError>;

    async fn list_rule_bindings_for_instance(
        &self,
        action_instance_id: Uuid,
    ) -> Result<Vec<RuleBindingRow>, DbError>;

    // ── Run claims and the audit log ──────────────────────────────────────

    /// Try to take the claim for `request.dedup_key`. Succeeds when no claim
    /// exists, or the previous attempt failed and attempts remain, or a
    /// running claim went stale.
    async fn claim_run(&self, request: ClaimRequest) -> Result<bool, DbError>;

    /// Settle a held claim as `Succeeded`, `Failed` (retryable) or
    /// `Abandoned` (never reclaimed).
    async fn finish_claim(
        &self,
        dedup_key: &str,
        status: ClaimStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DbError>;

    /// `Failed` claims with attempts left under `max_attempts`, oldest first.
    async fn list_retryable_claims(
        &self,
        max_attempts: i32,
    ) -> Result<Vec<ActionRunClaimRow>, DbError>;

    async fn get_claim(&self, dedup_key: &str) -> Result<Option<ActionRunClaimRow>, DbError>;

    async fn insert_action_run(&self, run: ActionRunRow) -> Result<ActionRunRow, DbError>;

    /// Runs for a pub, oldest first.
    async fn list_action_runs(&self, pub_id: Uuid) -> Result<Vec<ActionRunRow>, DbError>;

    async fn has_successful_run(&self, dedup_key: &str) -> Result<bool, DbError>;
}
