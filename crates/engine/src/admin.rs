//! Configuration-time operations: stages and their constraints, pub types
//! and pubs, action instances and rule bindings.
//!
//! These validate eagerly, so unknown kinds and bad configuration are
//! reported to whoever is editing the workflow rather than discovered when
//! a rule fires.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use actions::ActionKind;
use db::models::{
    ActionInstanceRow, MoveConstraintRow, PubRow, PubTypeRow, RuleBindingRow, StageRow,
};
use schemas::{CoreSchemaType, ObjectSchema};

use crate::executor::resolve_payload;
use crate::ordering::order_between;
use crate::rules::{DurationConfig, Event};
use crate::stage_graph::StageGraph;
use crate::workflow::ensure_community;
use crate::{EngineError, WorkflowEngine};

impl WorkflowEngine {
    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    pub async fn list_stages(&self, community_id: Uuid) -> Result<Vec<StageRow>, EngineError> {
        Ok(self.store.list_stages(community_id).await?)
    }

    /// Append a stage after the community's last one.
    pub async fn create_stage(&self, community_id: Uuid, name: &str) -> Result<StageRow, EngineError> {
        let stages = self.store.list_stages(community_id).await?;
        let last = stages.last().map(|s| s.order_key.as_str());
        let stage = StageRow {
            id: Uuid::new_v4(),
            community_id,
            name: name.to_owned(),
            order_key: order_between(last, None)?,
            created_at: self.clock.now(),
        };
        info!(stage_id = %stage.id, %community_id, "stage created");
        Ok(self.store.insert_stage(stage).await?)
    }

    /// Place `stage_id` directly after `after` (or first, when `None`).
    pub async fn reorder_stage(
        &self,
        stage_id: Uuid,
        after: Option<Uuid>,
    ) -> Result<StageRow, EngineError> {
        let mut stage = self.require_stage(stage_id).await?;
        let others: Vec<StageRow> = self
            .store
            .list_stages(stage.community_id)
            .await?
            .into_iter()
            .filter(|s| s.id != stage_id)
            .collect();

        let position = match after {
            None => 0,
            Some(after_id) => {
                let index = others
                    .iter()
                    .position(|s| s.id == after_id)
                    .ok_or(EngineError::StageNotFound(after_id))?;
                index + 1
            }
        };
        let before_key = position.checked_sub(1).map(|i| others[i].order_key.as_str());
        let after_key = others.get(position).map(|s| s.order_key.as_str());

        stage.order_key = order_between(before_key, after_key)?;
        self.store.update_stage_order(stage_id, &stage.order_key).await?;
        Ok(stage)
    }

    /// Delete an empty stage together with its action instances and their
    /// rule bindings. Move constraints at either end go with it.
    pub async fn delete_stage(&self, stage_id: Uuid) -> Result<(), EngineError> {
        self.require_stage(stage_id).await?;
        if !self.store.list_stage_occupants(stage_id).await?.is_empty() {
            return Err(EngineError::StageOccupied(stage_id));
        }
        for instance in self.store.get_action_instances_for_stage(stage_id).await? {
            self.delete_action_instance(instance.id).await?;
        }
        self.store.delete_stage(stage_id).await?;
        info!(%stage_id, "stage deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Move constraints
    // -----------------------------------------------------------------------

    /// Allow moves from `stage_id` to `destination_id`. Returns `false` if
    /// the edge already existed.
    pub async fn add_constraint(
        &self,
        stage_id: Uuid,
        destination_id: Uuid,
    ) -> Result<bool, EngineError> {
        let from = self.require_stage(stage_id).await?;
        let to = self.require_stage(destination_id).await?;
        ensure_community(from.community_id, &to)?;
        Ok(self
            .store
            .insert_move_constraint(MoveConstraintRow { stage_id, destination_id })
            .await?)
    }

    /// Returns `false` if no such edge existed.
    pub async fn remove_constraint(
        &self,
        stage_id: Uuid,
        destination_id: Uuid,
    ) -> Result<bool, EngineError> {
        Ok(self.store.delete_move_constraint(stage_id, destination_id).await?)
    }

    /// Whether a pub in `from` (or in no stage) may move to `to` within the
    /// community. Stages of other communities are never reachable.
    pub async fn can_move(
        &self,
        community_id: Uuid,
        from: Option<Uuid>,
        to: Uuid,
    ) -> Result<bool, EngineError> {
        let to_stage = self.require_stage(to).await?;
        if to_stage.community_id != community_id {
            return Ok(false);
        }
        let Some(from) = from else {
            return Ok(true);
        };
        let from_stage = self.require_stage(from).await?;
        if from_stage.community_id != community_id {
            return Ok(false);
        }
        let edges = self.store.get_move_constraints(from).await?;
        Ok(StageGraph::new(&edges).can_move(Some(from), to))
    }

    pub async fn destinations_of(&self, stage_id: Uuid) -> Result<BTreeSet<Uuid>, EngineError> {
        let edges = self.store.get_move_constraints(stage_id).await?;
        Ok(StageGraph::new(&edges).destinations_of(stage_id))
    }

    /// Stages reachable from `stage_id` by any number of legal moves.
    pub async fn reachable_from(&self, stage_id: Uuid) -> Result<Vec<Uuid>, EngineError> {
        let stage = self.require_stage(stage_id).await?;
        let edges = self.store.list_move_constraints(stage.community_id).await?;
        Ok(StageGraph::new(&edges).reachable_from(stage_id))
    }

    // -----------------------------------------------------------------------
    // Pub types and pubs
    // -----------------------------------------------------------------------

    pub async fn create_pub_type(
        &self,
        community_id: Uuid,
        name: &str,
        fields: BTreeMap<String, CoreSchemaType>,
    ) -> Result<PubTypeRow, EngineError> {
        let fields: Map<String, Value> = fields
            .into_iter()
            .map(|(slug, ty)| (slug, json!(ty.as_str())))
            .collect();
        let pub_type = PubTypeRow {
            id: Uuid::new_v4(),
            community_id,
            name: name.to_owned(),
            fields: Value::Object(fields),
        };
        Ok(self.store.insert_pub_type(pub_type).await?)
    }

    /// Create a pub after checking `values` against its type's fields.
    /// Fields are optional; values for undeclared fields are rejected.
    pub async fn create_pub(
        &self,
        community_id: Uuid,
        pub_type_id: Uuid,
        values: Value,
    ) -> Result<PubRow, EngineError> {
        let pub_type = self
            .store
            .get_pub_type(pub_type_id)
            .await?
            .ok_or(EngineError::PubTypeNotFound(pub_type_id))?;
        if pub_type.community_id != community_id {
            return Err(EngineError::CommunityMismatch { what: "pub type", id: pub_type_id });
        }

        let schema = pub_type_schema(&pub_type)?;
        let values = resolve_payload(&schema, &values).map_err(EngineError::PubValidation)?;

        let pub_row = PubRow {
            id: Uuid::new_v4(),
            community_id,
            pub_type_id,
            values,
            created_at: self.clock.now(),
        };
        Ok(self.store.insert_pub(pub_row).await?)
    }

    // -----------------------------------------------------------------------
    // Action instances
    // -----------------------------------------------------------------------

    pub async fn create_action_instance(
        &self,
        stage_id: Uuid,
        action: &str,
        name: &str,
        config: Value,
    ) -> Result<ActionInstanceRow, EngineError> {
        let stage = self.require_stage(stage_id).await?;
        let kind: ActionKind = action.parse()?;
        check_config(kind, &config)?;

        let now = self.clock.now();
        let instance = ActionInstanceRow {
            id: Uuid::new_v4(),
            community_id: stage.community_id,
            stage_id,
            action: kind.as_str().to_owned(),
            name: name.to_owned(),
            config,
            created_at: now,
            updated_at: now,
        };
        info!(action_instance_id = %instance.id, action = %kind, "action instance created");
        Ok(self.store.insert_action_instance(instance).await?)
    }

    pub async fn update_action_instance_config(
        &self,
        id: Uuid,
        config: Value,
    ) -> Result<ActionInstanceRow, EngineError> {
        let instance = self.require_action_instance(id).await?;
        let kind: ActionKind = instance.action.parse()?;
        check_config(kind, &config)?;
        Ok(self
            .store
            .update_action_instance_config(id, config, self.clock.now())
            .await?)
    }

    pub async fn list_action_instances(
        &self,
        community_id: Uuid,
    ) -> Result<Vec<ActionInstanceRow>, EngineError> {
        Ok(self.store.list_action_instances(community_id).await?)
    }

    /// Delete an instance, then its rule bindings. Returns how many bindings
    /// were removed. Bindings left behind by an interrupted delete are inert.
    pub async fn delete_action_instance(&self, id: Uuid) -> Result<u64, EngineError> {
        if !self.store.delete_action_instance(id).await? {
            return Err(EngineError::ActionInstanceNotFound(id));
        }
        let removed = match self.store.delete_rule_bindings_for_instance(id).await {
            Ok(n) => n,
            Err(e) => {
                warn!(action_instance_id = %id, error = %e, "rule binding cleanup failed");
                0
            }
        };
        info!(action_instance_id = %id, bindings_removed = removed, "action instance deleted");
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Rule bindings
    // -----------------------------------------------------------------------

    /// Bind `event` to an action instance.
    ///
    /// # Errors
    /// - `UnknownEventKind` for an event outside the catalog.
    /// - `RuleConfigValidation` when the config is missing, invalid, or given
    ///   to an event that takes none.
    /// - `DuplicateBinding` for a second entered/left binding on one instance.
    pub async fn create_rule_binding(
        &self,
        action_instance_id: Uuid,
        event: &str,
        additional_config: Option<Value>,
    ) -> Result<RuleBindingRow, EngineError> {
        let event: Event = event.parse()?;
        self.require_action_instance(action_instance_id).await?;

        let additional_config = match (&event.descriptor().additional_config_schema, additional_config)
        {
            (Some(schema), Some(config)) => Some(resolve_payload(schema, &config).map_err(
                |issues| EngineError::RuleConfigValidation { event: event.to_string(), issues },
            )?),
            (Some(_), None) => {
                return Err(EngineError::RuleConfigValidation {
                    event: event.to_string(),
                    issues: "additional config is required".into(),
                })
            }
            (None, Some(_)) => {
                return Err(EngineError::RuleConfigValidation {
                    event: event.to_string(),
                    issues: "this rule takes no additional config".into(),
                })
            }
            (None, None) => None,
        };

        if event == Event::PubInStageForDuration {
            let readable = additional_config
                .as_ref()
                .and_then(|config| DurationConfig::from_value(config).ok())
                .and_then(|config| config.threshold())
                .is_some();
            if !readable {
                return Err(EngineError::RuleConfigValidation {
                    event: event.to_string(),
                    issues: "duration must be a whole number of intervals within range".into(),
                });
            }
        } else {
            let existing = self
                .store
                .get_rule_bindings_for_event(event.as_str(), action_instance_id)
                .await?;
            if !existing.is_empty() {
                return Err(EngineError::DuplicateBinding {
                    event: event.to_string(),
                    action_instance_id,
                });
            }
        }

        let binding = RuleBindingRow {
            id: Uuid::new_v4(),
            event: event.as_str().to_owned(),
            action_instance_id,
            additional_config,
            created_at: self.clock.now(),
        };
        Ok(self.store.insert_rule_binding(binding).await?)
    }

    /// Returns `false` if no such binding existed.
    pub async fn delete_rule_binding(&self, id: Uuid) -> Result<bool, EngineError> {
        Ok(self.store.delete_rule_binding(id).await?)
    }

    pub async fn list_rule_bindings_for_instance(
        &self,
        action_instance_id: Uuid,
    ) -> Result<Vec<RuleBindingRow>, EngineError> {
        Ok(self
            .store
            .list_rule_bindings_for_instance(action_instance_id)
            .await?)
    }
}

fn check_config(kind: ActionKind, config: &Value) -> Result<(), EngineError> {
    resolve_payload(&kind.descriptor().config_schema, config)
        .map(|_| ())
        .map_err(|issues| EngineError::ConfigValidation { kind: kind.to_string(), issues })
}

/// Object schema of a pub type: every declared field optional, nothing else
/// allowed.
fn pub_type_schema(pub_type: &PubTypeRow) -> Result<Value, EngineError> {
    let mut schema = ObjectSchema::new();
    if let Some(fields) = pub_type.fields.as_object() {
        for (slug, ty) in fields {
            let ty: CoreSchemaType = ty.as_str().unwrap_or_default().parse()?;
            schema = schema.optional(slug, ty, "");
        }
    }
    Ok(schema.build())
}
