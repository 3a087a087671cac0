//! Postgres-backed [`Store`], delegating to the repository functions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    ActionInstanceRow, ActionRunClaimRow, ActionRunRow, ClaimStatus, MoveConstraintRow,
    PubInStageRow, PubRow, PubTypeRow, RuleBindingRow, StageRow,
};
use crate::repository::{action_instances, occupancy, pubs, rule_bindings, runs, stages};
use crate::store::{ClaimRequest, Store};
use crate::{DbError, DbPool};

/// Postgres store over a shared pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_stage(&self, stage: StageRow) -> Result<StageRow, DbError> {
        stages::insert_stage(&self.pool, &stage).await
    }

    async fn get_stage(&self, id: Uuid) -> Result<Option<StageRow>, DbError> {
        stages::get_stage(&self.pool, id).await
    }

    async fn list_stages(&self, community_id: Uuid) -> Result<Vec<StageRow>, DbError> {
        stages::list_stages(&self.pool, community_id).await
    }

    async fn update_stage_order(&self, id: Uuid, order_key: &str) -> Result<(), DbError> {
        stages::update_stage_order(&self.pool, id, order_key).await
    }

    async fn delete_stage(&self, id: Uuid) -> Result<(), DbError> {
        stages::delete_stage(&self.pool, id).await
    }

    async fn insert_move_constraint(&self, edge: MoveConstraintRow) -> Result<bool, DbError> {
        stages::insert_move_constraint(&self.pool, edge).await
    }

    async fn delete_move_constraint(
        &self,
        stage_id: Uuid,
        destination_id: Uuid,
    ) -> Result<bool, DbError> {
        stages::delete_move_constraint(&self.pool, stage_id, destination_id).await
    }

    async fn get_move_constraints(&self, stage_id: Uuid) -> Result<Vec<MoveConstraintRow>, DbError> {
        stages::get_move_constraints(&self.pool, stage_id).await
    }

    async fn list_move_constraints(
        &self,
        community_id: Uuid,
    ) -> Result<Vec<MoveConstraintRow>, DbError> {
        stages::list_move_constraints(&self.pool, community_id).await
    }

    async fn insert_pub_type(&self, pub_type: PubTypeRow) -> Result<PubTypeRow, DbError> {
        pubs::insert_pub_type(&self.pool, &pub_type).await
    }

    async fn get_pub_type(&self, id: Uuid) -> Result<Option<PubTypeRow>, DbError> {
        pubs::get_pub_type(&self.pool, id).await
    }

    async fn insert_pub(&self, pub_row: PubRow) -> Result<PubRow, DbError> {
        pubs::insert_pub(&self.pool, &pub_row).await
    }

    async fn get_pub(&self, id: Uuid) -> Result<Option<PubRow>, DbError> {
        pubs::get_pub(&self.pool, id).await
    }

    async fn list_pub_stages(&self, pub_id: Uuid) -> Result<Vec<PubInStageRow>, DbError> {
        occupancy::list_pub_stages(&self.pool, pub_id).await
    }

    async fn list_stage_occupants(&self, stage_id: Uuid) -> Result<Vec<PubInStageRow>, DbError> {
        occupancy::list_stage_occupants(&self.pool, stage_id).await
    }

    async fn get_pub_in_stage(&self, id: Uuid) -> Result<Option<PubInStageRow>, DbError> {
        occupancy::get_pub_in_stage(&self.pool, id).await
    }

    async fn insert_pub_in_stage(&self, row: PubInStageRow) -> Result<PubInStageRow, DbError> {
        occupancy::insert_pub_in_stage(&self.pool, &row).await
    }

    async fn delete_pub_in_stage(
        &self,
        pub_id: Uuid,
        stage_id: Uuid,
    ) -> Result<Option<PubInStageRow>, DbError> {
        occupancy::delete_pub_in_stage(&self.pool, pub_id, stage_id).await
    }

    async fn replace_pub_in_stage(
        &self,
        from_stage_id: Option<Uuid>,
        row: PubInStageRow,
    ) -> Result<Option<PubInStageRow>, DbError> {
        occupancy::replace_pub_in_stage(&self.pool, from_stage_id, &row).await
    }

    async fn insert_action_instance(
        &self,
        instance: ActionInstanceRow,
    ) -> Result<ActionInstanceRow, DbError> {
        action_instances::insert_action_instance(&self.pool, &instance).await
    }

    async fn get_action_instance(&self, id: Uuid) -> Result<Option<ActionInstanceRow>, DbError> {
        action_instances::get_action_instance(&self.pool, id).await
    }

    async fn update_action_instance_config(
        &self,
        id: Uuid,
        config: serde_json::Value,
        updated_at: DateTime<Utc>,
    ) -> Result<ActionInstanceRow, DbError> {
        action_instances::update_action_instance_config(&self.pool, id, &config, updated_at).await
    }

    async fn delete_action_instance(&self, id: Uuid) -> Result<bool, DbError> {
        action_instances::delete_action_instance(&self.pool, id).await
    }

    async fn get_action_instances_for_stage(
        &self,
        stage_id: Uuid,
    ) -> Result<Vec<ActionInstanceRow>, DbError> {
        action_instances::get_action_instances_for_stage(&self.pool, stage_id).await
    }

    async fn list_action_instances(
        &self,
        community_id: Uuid,
    ) -> Result<Vec<ActionInstanceRow>, DbError> {
        action_instances::list_action_instances(&self.pool, community_id).await
    }

    async fn insert_rule_binding(&self, binding: RuleBindingRow) -> Result<RuleBindingRow, DbError> {
        rule_bindings::insert_rule_binding(&self.pool, &binding).await
    }

    async fn get_rule_binding(&self, id: Uuid) -> Result<Option<RuleBindingRow>, DbError> {
        rule_bindings::get_rule_binding(&self.pool, id).await
    }

    async fn delete_rule_binding(&self, id: Uuid) -> Result<bool, DbError> {
        rule_bindings::delete_rule_binding(&self.pool, id).await
    }

    async fn delete_rule_bindings_for_instance(
        &self,
        action_instance_id: Uuid,
    ) -> Result<u64, DbError> {
        rule_bindings::delete_rule_bindings_for_instance(&self.pool, action_instance_id).await
    }

    async fn get_rule_bindings_for_event(
        &self,
        event: &str,
        action_instance_id: Uuid,
    ) -> Result<Vec<RuleBindingRow>, DbError> {
        rule_bindings::get_rule_bindings_for_event(&self.pool, event, action_instance_id).await
    }

    async fn list_rule_bindings_by_event(&self, event: &str) -> Result<Vec<RuleBindingRow>, DbError> {
        rule_bindings::list_rule_bindings_by_event(&self.pool, event).await
    }

    async fn list_rule_bindings_for_instance(
        &self,
        action_instance_id: Uuid,
    ) -> Result<Vec<RuleBindingRow>, DbError> {
        rule_bindings::list_rule_bindings_for_instance(&self.pool, action_instance_id).await
    }

    async fn claim_run(&self, request: ClaimRequest) -> Result<bool, DbError> {
        runs::claim_run(&self.pool, &request).await
    }

    async fn finish_claim(
        &self,
        dedup_key: &str,
        status: ClaimStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        runs::finish_claim(&self.pool, dedup_key, status, now).await
    }

    async fn list_retryable_claims(
        &self,
        max_attempts: i32,
    ) -> Result<Vec<ActionRunClaimRow>, DbError> {
        runs::list_retryable_claims(&self.pool, max_attempts).await
    }

    async fn get_claim(&self, dedup_key: &str) -> Result<Option<ActionRunClaimRow>, DbError> {
        runs::get_claim(&self.pool, dedup_key).await
    }

    async fn insert_action_run(&self, run: ActionRunRow) -> Result<ActionRunRow, DbError> {
        runs::insert_action_run(&self.pool, &run).await
    }

    async fn list_action_runs(&self, pub_id: Uuid) -> Result<Vec<ActionRunRow>, DbError> {
        runs::list_action_runs(&self.pool, pub_id).await
    }

    async fn has_successful_run(&self, dedup_key: &str) -> Result<bool, DbError> {
        runs::has_successful_run(&self.pool, dedup_key).await
    }
}
