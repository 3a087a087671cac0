//! In-memory [`Store`] implementation.
//!
//! Deterministic and test-friendly. Every operation takes one lock over the
//! whole state, so multi-row operations are trivially atomic. Production
//! deployments should use [`crate::PgStore`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    ActionInstanceRow, ActionRunClaimRow, ActionRunRow, ClaimStatus, MoveConstraintRow,
    PubInStageRow, PubRow, PubTypeRow, RuleBindingRow, StageRow,
};
use crate::store::{ClaimRequest, Store};
use crate::DbError;

#[derive(Default)]
struct MemoryState {
    stages: HashMap<Uuid, StageRow>,
    constraints: Vec<MoveConstraintRow>,
    pub_types: HashMap<Uuid, PubTypeRow>,
    pubs: HashMap<Uuid, PubRow>,
    occupancy: Vec<PubInStageRow>,
    instances: HashMap<Uuid, ActionInstanceRow>,
    bindings: Vec<RuleBindingRow>,
    claims: HashMap<String, ActionRunClaimRow>,
    runs: Vec<ActionRunRow>,
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, DbError> {
        self.state
            .lock()
            .map_err(|_| DbError::Backend("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_stage(&self, stage: StageRow) -> Result<StageRow, DbError> {
        let mut s = self.lock()?;
        if s.stages.contains_key(&stage.id) {
            return Err(DbError::Conflict(format!("stage {} already exists", stage.id)));
        }
        s.stages.insert(stage.id, stage.clone());
        Ok(stage)
    }

    async fn get_stage(&self, id: Uuid) -> Result<Option<StageRow>, DbError> {
        Ok(self.lock()?.stages.get(&id).cloned())
    }

    async fn list_stages(&self, community_id: Uuid) -> Result<Vec<StageRow>, DbError> {
        let s = self.lock()?;
        let mut stages: Vec<StageRow> = s
            .stages
            .values()
            .filter(|st| st.community_id == community_id)
            .cloned()
            .collect();
        stages.sort_by(|a, b| a.order_key.cmp(&b.order_key).then(a.id.cmp(&b.id)));
        Ok(stages)
    }

    async fn update_stage_order(&self, id: Uuid, order_key: &str) -> Result<(), DbError> {
        let mut s = self.lock()?;
        let stage = s.stages.get_mut(&id).ok_or(DbError::NotFound)?;
        stage.order_key = order_key.to_owned();
        Ok(())
    }

    async fn delete_stage(&self, id: Uuid) -> Result<(), DbError> {
        let mut s = self.lock()?;
        if s.stages.remove(&id).is_none() {
            return Err(DbError::NotFound);
        }
        s.constraints.retain(|c| c.stage_id != id && c.destination_id != id);
        s.occupancy.retain(|o| o.stage_id != id);
        Ok(())
    }

    async fn insert_move_constraint(&self, edge: MoveConstraintRow) -> Result<bool, DbError> {
        let mut s = self.lock()?;
        if s.constraints.contains(&edge) {
            return Ok(false);
        }
        s.constraints.push(edge);
        Ok(true)
    }

    async fn delete_move_constraint(
        &self,
        stage_id: Uuid,
        destination_id: Uuid,
    ) -> Result<bool, DbError> {
        let mut s = self.lock()?;
        let before = s.constraints.len();
        s.constraints
            .retain(|c| !(c.stage_id == stage_id && c.destination_id == destination_id));
        Ok(s.constraints.len() != before)
    }

    async fn get_move_constraints(&self, stage_id: Uuid) -> Result<Vec<MoveConstraintRow>, DbError> {
        let s = self.lock()?;
        Ok(s.constraints.iter().filter(|c| c.stage_id == stage_id).copied().collect())
    }

    async fn list_move_constraints(
        &self,
        community_id: Uuid,
    ) -> Result<Vec<MoveConstraintRow>, DbError> {
        let s = self.lock()?;
        Ok(s.constraints
            .iter()
            .filter(|c| {
                s.stages
                    .get(&c.stage_id)
                    .is_some_and(|st| st.community_id == community_id)
            })
            .copied()
            .collect())
    }

    async fn insert_pub_type(&self, pub_type: PubTypeRow) -> Result<PubTypeRow, DbError> {
        let mut s = self.lock()?;
        s.pub_types.insert(pub_type.id, pub_type.clone());
        Ok(pub_type)
    }

    async fn get_pub_type(&self, id: Uuid) -> Result<Option<PubTypeRow>, DbError> {
        Ok(self.lock()?.pub_types.get(&id).cloned())
    }

    async fn insert_pub(&self, pub_row: PubRow) -> Result<PubRow, DbError> {
        let mut s = self.lock()?;
        if s.pubs.contains_key(&pub_row.id) {
            return Err(DbError::Conflict(format!("pub {} already exists", pub_row.id)));
        }
        s.pubs.insert(pub_row.id, pub_row.clone());
        Ok(pub_row)
    }

    async fn get_pub(&self, id: Uuid) -> Result<Option<PubRow>, DbError> {
        Ok(self.lock()?.pubs.get(&id).cloned())
    }

    async fn list_pub_stages(&self, pub_id: Uuid) -> Result<Vec<PubInStageRow>, DbError> {
        let s = self.lock()?;
        Ok(s.occupancy.iter().filter(|o| o.pub_id == pub_id).cloned().collect())
    }

    async fn list_stage_occupants(&self, stage_id: Uuid) -> Result<Vec<PubInStageRow>, DbError> {
        let s = self.lock()?;
        Ok(s.occupancy.iter().filter(|o| o.stage_id == stage_id).cloned().collect())
    }

    async fn get_pub_in_stage(&self, id: Uuid) -> Result<Option<PubInStageRow>, DbError> {
        Ok(self.lock()?.occupancy.iter().find(|o| o.id == id).cloned())
    }

    async fn insert_pub_in_stage(&self, row: PubInStageRow) -> Result<PubInStageRow, DbError> {
        let mut s = self.lock()?;
        if s
            .occupancy
            .iter()
            .any(|o| o.pub_id == row.pub_id && o.stage_id == row.stage_id)
        {
            return Err(DbError::Conflict(format!(
                "pub {} already in stage {}",
                row.pub_id, row.stage_id
            )));
        }
        s.occupancy.push(row.clone());
        Ok(row)
    }

    async fn delete_pub_in_stage(
        &self,
        pub_id: Uuid,
        stage_id: Uuid,
    ) -> Result<Option<PubInStageRow>, DbError> {
        let mut s = self.lock()?;
        let pos = s
            .occupancy
            .iter()
            .position(|o| o.pub_id == pub_id && o.stage_id == stage_id);
        Ok(pos.map(|i| s.occupancy.remove(i)))
    }

    async fn replace_pub_in_stage(
        &self,
        from_stage_id: Option<Uuid>,
        row: PubInStageRow,
    ) -> Result<Option<PubInStageRow>, DbError> {
        let mut s = self.lock()?;

        let from_pos = match from_stage_id {
            Some(from) => Some(
                s.occupancy
                    .iter()
                    .position(|o| o.pub_id == row.pub_id && o.stage_id == from)
                    .ok_or(DbError::NotFound)?,
            ),
            None => None,
        };

        let target_taken = s
            .occupancy
            .iter()
            .enumerate()
            .any(|(i, o)| o.pub_id == row.pub_id && o.stage_id == row.stage_id && Some(i) != from_pos);
        if target_taken {
            return Err(DbError::Conflict(format!(
                "pub {} already in stage {}",
                row.pub_id, row.stage_id
            )));
        }

        let removed = from_pos.map(|i| s.occupancy.remove(i));
        s.occupancy.push(row);
        Ok(removed)
    }

    async fn insert_action_instance(
        &self,
        instance: ActionInstanceRow,
    ) -> Result<ActionInstanceRow, DbError> {
        let mut s = self.lock()?;
        s.instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    async fn get_action_instance(&self, id: Uuid) -> Result<Option<ActionInstanceRow>, DbError> {
        Ok(self.lock()?.instances.get(&id).cloned())
    }

    async fn update_action_instance_config(
        &self,
        id: Uuid,
        config: serde_json::Value,
        updated_at: DateTime<Utc>,
    ) -> Result<ActionInstanceRow, DbError> {
        let mut s = self.lock()?;
        let instance = s.instances.get_mut(&id).ok_or(DbError::NotFound)?;
        instance.config = config;
        instance.updated_at = updated_at;
        Ok(instance.clone())
    }

    async fn delete_action_instance(&self, id: Uuid) -> Result<bool, DbError> {
        Ok(self.lock()?.instances.remove(&id).is_some())
    }

    async fn get_action_instances_for_stage(
        &self,
        stage_id: Uuid,
    ) -> Result<Vec<ActionInstanceRow>, DbError> {
        let s = self.lock()?;
        let mut rows: Vec<ActionInstanceRow> = s
            .instances
            .values()
            .filter(|i| i.stage_id == stage_id)
            .cloned()
            .collect();
        rows.sort_by_key(|i| (i.created_at, i.id));
        Ok(rows)
    }

    async fn list_action_instances(
        &self,
        community_id: Uuid,
    ) -> Result<Vec<ActionInstanceRow>, DbError> {
        let s = self.lock()?;
        let mut rows: Vec<ActionInstanceRow> = s
            .instances
            .values()
            .filter(|i| i.community_id == community_id)
            .cloned()
            .collect();
        rows.sort_by_key(|i| (i.created_at, i.id));
        Ok(rows)
    }

    async fn insert_rule_binding(&self, binding: RuleBindingRow) -> Result<RuleBindingRow, DbError> {
        let mut s = self.lock()?;
        s.bindings.push(binding.clone());
        Ok(binding)
    }

    async fn get_rule_binding(&self, id: Uuid) -> Result<Option<RuleBindingRow>, DbError> {
        Ok(self.lock()?.bindings.iter().find(|b| b.id == id).cloned())
    }

    async fn delete_rule_binding(&self, id: Uuid) -> Result<bool, DbError> {
        let mut s = self.lock()?;
        let before = s.bindings.len();
        s.bindings.retain(|b| b.id != id);
        Ok(s.bindings.len() != before)
    }

    async fn delete_rule_bindings_for_instance(
        &self,
        action_instance_id: Uuid,
    ) -> Result<u64, DbError> {
        let mut s = self.lock()?;
        let before = s.bindings.len();
        s.bindings.retain(|b| b.action_instance_id != action_instance_id);
        Ok((before - s.bindings.len()) as u64)
    }

    async fn get_rule_bindings_for_event(
        &self,
        event: &str,
        action_instance_id: Uuid,
    ) -> Result<Vec<RuleBindingRow>, DbError> {
        let s = self.lock()?;
        Ok(s.bindings
            .iter()
            .filter(|b| b.event == event && b.action_instance_id == action_instance_id)
            .cloned()
            .collect())
    }

    async fn list_rule_bindings_by_event(&self, event: &str) -> Result<Vec<RuleBindingRow>, DbError> {
        let s = self.lock()?;
        Ok(s.bindings.iter().filter(|b| b.event == event).cloned().collect())
    }

    async fn list_rule_bindings_for_instance(
        &self,
        action_instance_id: Uuid,
    ) -> Result<Vec<RuleBindingRow>, DbError> {
        let s = self.lock()?;
        Ok(s.bindings
            .iter()
            .filter(|b| b.action_instance_id == action_instance_id)
            .cloned()
            .collect())
    }

    async fn claim_run(&self, request: ClaimRequest) -> Result<bool, DbError> {
        let mut s = self.lock()?;
        match s.claims.get_mut(&request.dedup_key) {
            None => {
                s.claims.insert(
                    request.dedup_key.clone(),
                    ActionRunClaimRow {
                        dedup_key: request.dedup_key,
                        status: ClaimStatus::Claimed.to_string(),
                        attempts: 1,
                        claimed_at: request.now,
                    },
                );
                Ok(true)
            }
            Some(claim) => {
                let reclaimable = claim.attempts < request.max_attempts
                    && match claim.status() {
                        Some(ClaimStatus::Failed) => true,
                        Some(ClaimStatus::Claimed) => claim.claimed_at < request.stale_before,
                        _ => false,
                    };
                if reclaimable {
                    claim.status = ClaimStatus::Claimed.to_string();
                    claim.attempts += 1;
                    claim.claimed_at = request.now;
                }
                Ok(reclaimable)
            }
        }
    }

    async fn finish_claim(
        &self,
        dedup_key: &str,
        status: ClaimStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut s = self.lock()?;
        let claim = s.claims.get_mut(dedup_key).ok_or(DbError::NotFound)?;
        claim.status = status.to_string();
        claim.claimed_at = now;
        Ok(())
    }

    async fn list_retryable_claims(
        &self,
        max_attempts: i32,
    ) -> Result<Vec<ActionRunClaimRow>, DbError> {
        let s = self.lock()?;
        let mut claims: Vec<ActionRunClaimRow> = s
            .claims
            .values()
            .filter(|c| c.status() == Some(ClaimStatus::Failed) && c.attempts < max_attempts)
            .cloned()
            .collect();
        claims.sort_by(|a, b| a.claimed_at.cmp(&b.claimed_at).then_with(|| a.dedup_key.cmp(&b.dedup_key)));
        Ok(claims)
    }

    async fn get_claim(&self, dedup_key: &str) -> Result<Option<ActionRunClaimRow>, DbError> {
        Ok(self.lock()?.claims.get(dedup_key).cloned())
    }

    async fn insert_action_run(&self, run: ActionRunRow) -> Result<ActionRunRow, DbError> {
        let mut s = self.lock()?;
        s.runs.push(run.clone());
        Ok(run)
    }

    async fn list_action_runs(&self, pub_id: Uuid) -> Result<Vec<ActionRunRow>, DbError> {
        let s = self.lock()?;
        Ok(s.runs.iter().filter(|r| r.pub_id == pub_id).cloned().collect())
    }

    async fn has_successful_run(&self, dedup_key: &str) -> Result<bool, DbError> {
        let s = self.lock()?;
        Ok(s.runs.iter().any(|r| r.dedup_key == dedup_key && r.success))
    }
}
