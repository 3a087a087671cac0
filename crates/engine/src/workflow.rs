//! The workflow engine: moves pubs between stages and fires the rules bound
//! to those moves.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use actions::{ActionKind, Integrations, Services};
use db::models::{ActionInstanceRow, ActionRunRow, ClaimStatus, PubInStageRow, PubRow, StageRow};
use db::{DbError, Store};
use schemas::ValidationResult;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::executor::{resolve_payload, Invocation};
use crate::locks::PubLocks;
use crate::models::{
    ActionOutcome, DueInvocation, InvocationReport, MoveOutcome, SkipReason, Trigger,
};
use crate::mover::EngineMover;
use crate::rules::{describe_binding, DurationConfig, Event};
use crate::stage_graph::StageGraph;
use crate::EngineError;

/// Orchestrates moves, manual runs and duration-rule firing.
///
/// Construct one per process with [`WorkflowEngine::new`] and share the
/// returned `Arc`. The `move` action re-enters the engine through a weak
/// self-reference, so the engine is always handed out behind an `Arc`.
pub struct WorkflowEngine {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: EngineConfig,
    pub(crate) services: Services,
    locks: PubLocks,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        integrations: Integrations,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|engine| Self {
            store,
            clock,
            config,
            services: integrations.with_mover(Arc::new(EngineMover::new(engine.clone()))),
            locks: PubLocks::new(),
        })
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Moves
    // -----------------------------------------------------------------------

    /// Move `pub_id` from `from_stage_id` (or nowhere, for a first placement)
    /// into `to_stage_id`, then fire left-stage rules followed by
    /// entered-stage rules.
    ///
    /// Passing `None` as the source adds an occupancy without consulting
    /// any move constraint and without leaving the pub's other stages. A pub
    /// may occupy several stages at once, so this is also how a pub already
    /// in one stage is placed into a second, unrelated one. Callers that
    /// need the stage graph enforced must name the stage being left.
    ///
    /// # Errors
    /// Legality, lookup, occupancy and storage errors abort the move before
    /// anything changes. Action failures never do; they are reported in the
    /// outcome.
    pub async fn move_pub(
        &self,
        pub_id: Uuid,
        from_stage_id: Option<Uuid>,
        to_stage_id: Uuid,
    ) -> Result<MoveOutcome, EngineError> {
        self.move_pub_at_depth(pub_id, from_stage_id, to_stage_id, 0).await
    }

    #[instrument(skip(self))]
    pub(crate) async fn move_pub_at_depth(
        &self,
        pub_id: Uuid,
        from_stage_id: Option<Uuid>,
        to_stage_id: Uuid,
        cascade_depth: u32,
    ) -> Result<MoveOutcome, EngineError> {
        if cascade_depth > self.config.max_cascade_depth {
            return Err(EngineError::CascadeLimit(self.config.max_cascade_depth));
        }

        // Held until the occupancy change is committed; released before any
        // action runs so a `move` action can move the same pub again.
        let guard = self.locks.acquire(pub_id).await;

        let pub_row = self.require_pub(pub_id).await?;
        let to_stage = self.require_stage(to_stage_id).await?;
        ensure_community(pub_row.community_id, &to_stage)?;

        if let Some(from) = from_stage_id {
            let from_stage = self.require_stage(from).await?;
            ensure_community(pub_row.community_id, &from_stage)?;
            let graph = StageGraph::new(&self.store.get_move_constraints(from).await?);
            if !graph.can_move(Some(from), to_stage_id) {
                return Err(EngineError::IllegalTransition { from, to: to_stage_id });
            }
        }

        // Every read that can fail happens before the commit, so an error
        // never leaves the pub moved without its rules.
        let left_bound = match from_stage_id {
            Some(from) => self.bound_instances(Event::PubLeftStage, from).await?,
            None => Vec::new(),
        };
        let entered_bound = self.bound_instances(Event::PubEnteredStage, to_stage_id).await?;

        let occupancy = PubInStageRow {
            id: Uuid::new_v4(),
            pub_id,
            stage_id: to_stage_id,
            entered_at: self.clock.now(),
        };
        let removed = self
            .store
            .replace_pub_in_stage(from_stage_id, occupancy.clone())
            .await
            .map_err(|e| match (e, from_stage_id) {
                (DbError::NotFound, Some(stage_id)) => EngineError::NotInStage { pub_id, stage_id },
                (DbError::Conflict(_), _) => EngineError::AlreadyInStage {
                    pub_id,
                    stage_id: to_stage_id,
                },
                (e, _) => EngineError::Database(e),
            })?;

        drop(guard);
        info!(occupancy_id = %occupancy.id, "pub moved");

        let left = match &removed {
            Some(old) => plan(
                left_bound,
                &pub_row,
                Trigger::Left { occupancy_id: old.id },
                cascade_depth,
            ),
            None => Vec::new(),
        };
        let entered = plan(
            entered_bound,
            &pub_row,
            Trigger::Entered { occupancy_id: occupancy.id },
            cascade_depth,
        );

        let mut outcome = MoveOutcome {
            pub_id,
            from_stage_id,
            to_stage_id,
            occupancy,
            left: Vec::with_capacity(left.len()),
            entered: Vec::with_capacity(entered.len()),
        };
        for invocation in left {
            outcome.left.push(self.invoke(invocation).await);
        }
        for invocation in entered {
            outcome.entered.push(self.invoke(invocation).await);
        }

        if outcome.failed() > 0 {
            warn!(pub_id = %pub_id, "{}", outcome.summary());
        }
        Ok(outcome)
    }

    /// Action instances on `stage_id` with at least one binding for `event`.
    async fn bound_instances(
        &self,
        event: Event,
        stage_id: Uuid,
    ) -> Result<Vec<ActionInstanceRow>, EngineError> {
        let mut bound = Vec::new();
        for instance in self.store.get_action_instances_for_stage(stage_id).await? {
            // One invocation per instance: a second binding of the same
            // event would share its dedup key anyway.
            if self.has_binding(event, instance.id).await? {
                bound.push(instance);
            }
        }
        Ok(bound)
    }

    async fn has_binding(&self, event: Event, action_instance_id: Uuid) -> Result<bool, EngineError> {
        Ok(!self
            .store
            .get_rule_bindings_for_event(event.as_str(), action_instance_id)
            .await?
            .is_empty())
    }

    // -----------------------------------------------------------------------
    // Manual runs
    // -----------------------------------------------------------------------

    /// Run an action instance for a pub right now, bypassing rule matching.
    ///
    /// # Errors
    /// An unknown kind or params that fail the kind's schema are returned
    /// directly. Failures of the action itself are in the report.
    #[instrument(skip(self, params))]
    pub async fn run_action_manually(
        &self,
        action_instance_id: Uuid,
        pub_id: Uuid,
        params: Value,
    ) -> Result<InvocationReport, EngineError> {
        let instance = self.require_action_instance(action_instance_id).await?;
        let pub_row = self.require_pub(pub_id).await?;
        if pub_row.community_id != instance.community_id {
            return Err(EngineError::CommunityMismatch { what: "pub", id: pub_id });
        }

        let kind: ActionKind = instance.action.parse()?;
        resolve_payload(&kind.descriptor().params_schema, &params).map_err(|issues| {
            EngineError::ParamsValidation { kind: kind.to_string(), issues }
        })?;

        let invocation = Invocation {
            instance,
            pub_row,
            trigger: Trigger::Manual { request_id: Uuid::new_v4() },
            params,
            cascade_depth: 0,
        };
        Ok(self.invoke(invocation).await)
    }

    pub async fn list_action_runs(&self, pub_id: Uuid) -> Result<Vec<ActionRunRow>, EngineError> {
        Ok(self.store.list_action_runs(pub_id).await?)
    }

    // -----------------------------------------------------------------------
    // Duration rules
    // -----------------------------------------------------------------------

    /// Every `(duration binding, occupancy)` pair whose threshold has elapsed
    /// and that may still run: no success yet, not abandoned, attempts left.
    ///
    /// Orphaned bindings and bindings with unreadable or out-of-range config
    /// are skipped with a warning.
    pub async fn due_duration_invocations(&self) -> Result<Vec<DueInvocation>, EngineError> {
        let now = self.clock.now();
        let mut due = Vec::new();

        for binding in self
            .store
            .list_rule_bindings_by_event(Event::PubInStageForDuration.as_str())
            .await?
        {
            let Some(instance) = self.store.get_action_instance(binding.action_instance_id).await?
            else {
                warn!(
                    rule_binding_id = %binding.id,
                    action_instance_id = %binding.action_instance_id,
                    "skipping orphaned rule binding"
                );
                continue;
            };

            let threshold = binding
                .additional_config
                .as_ref()
                .and_then(|config| DurationConfig::from_value(config).ok())
                .and_then(|config| config.threshold());
            let Some(threshold) = threshold else {
                warn!(rule_binding_id = %binding.id, "skipping duration rule without valid config");
                continue;
            };

            for occupancy in self.store.list_stage_occupants(instance.stage_id).await? {
                let Some(due_at) = occupancy.entered_at.checked_add_signed(threshold) else {
                    warn!(
                        rule_binding_id = %binding.id,
                        occupancy_id = %occupancy.id,
                        "duration threshold is out of range; skipping"
                    );
                    continue;
                };
                if now < due_at {
                    continue;
                }
                let trigger = Trigger::Duration {
                    rule_binding_id: binding.id,
                    occupancy_id: occupancy.id,
                };
                let dedup_key = trigger.dedup_key(instance.id, occupancy.pub_id);
                if self.is_settled(&dedup_key).await? {
                    continue;
                }
                due.push(DueInvocation {
                    trigger,
                    instance: instance.clone(),
                    occupancy,
                    due_at,
                });
            }
        }
        Ok(due)
    }

    /// Failed entered-stage invocations that may be attempted again: the
    /// claim has attempts left, the occupancy that triggered it is still
    /// current and the instance is still bound to `pubEnteredStage`.
    ///
    /// Left-stage failures are not swept; their occupancy is gone by
    /// definition, so a manual run is the way to repeat them.
    pub async fn retryable_entered_invocations(&self) -> Result<Vec<DueInvocation>, EngineError> {
        let mut retries = Vec::new();
        for claim in self.store.list_retryable_claims(self.max_attempts()).await? {
            let Some((instance_id, _, trigger)) = Trigger::parse_dedup_key(&claim.dedup_key) else {
                warn!(dedup_key = %claim.dedup_key, "skipping claim with unreadable dedup key");
                continue;
            };
            let Trigger::Entered { occupancy_id } = trigger else {
                continue;
            };
            let Some(occupancy) = self.store.get_pub_in_stage(occupancy_id).await? else {
                debug!(dedup_key = %claim.dedup_key, "occupancy ended; not retrying");
                continue;
            };
            let Some(instance) = self.store.get_action_instance(instance_id).await? else {
                continue;
            };
            if instance.stage_id != occupancy.stage_id
                || !self.has_binding(Event::PubEnteredStage, instance.id).await?
            {
                continue;
            }
            retries.push(DueInvocation {
                trigger,
                instance,
                occupancy,
                due_at: claim.claimed_at,
            });
        }
        Ok(retries)
    }

    /// Whether `dedup_key` will never run again: it succeeded, was
    /// abandoned, or used up its attempts.
    async fn is_settled(&self, dedup_key: &str) -> Result<bool, EngineError> {
        if self.store.has_successful_run(dedup_key).await? {
            return Ok(true);
        }
        let settled = match self.store.get_claim(dedup_key).await? {
            Some(claim) => match claim.status() {
                Some(ClaimStatus::Succeeded | ClaimStatus::Abandoned) => true,
                Some(ClaimStatus::Failed) => claim.attempts >= self.max_attempts(),
                Some(ClaimStatus::Claimed) | None => false,
            },
            None => false,
        };
        Ok(settled)
    }

    /// Invoke one due item, unless its occupancy has ended since it was
    /// found.
    pub async fn fire_due(&self, due: DueInvocation) -> Result<InvocationReport, EngineError> {
        let still_there = self.store.get_pub_in_stage(due.occupancy.id).await?.is_some();
        if !still_there {
            return Ok(InvocationReport {
                action_instance_id: due.instance.id,
                action_instance_name: due.instance.name.clone(),
                action: due.instance.action.clone(),
                event: due.trigger.event(),
                dedup_key: due.dedup_key(),
                outcome: ActionOutcome::Skipped { reason: SkipReason::NoLongerInStage },
            });
        }

        let pub_row = self.require_pub(due.occupancy.pub_id).await?;
        Ok(self
            .invoke(Invocation {
                instance: due.instance,
                pub_row,
                trigger: due.trigger,
                params: Value::Null,
                cascade_depth: 0,
            })
            .await)
    }

    // -----------------------------------------------------------------------
    // Presentation helpers
    // -----------------------------------------------------------------------

    /// Human-readable phrase for a rule, e.g. "a pub stays in this stage for
    /// 3 days".
    pub fn render_rule_description(
        &self,
        event: &str,
        config: Option<&Value>,
    ) -> Result<String, EngineError> {
        let event: Event = event.parse()?;
        Ok(event.render(config))
    }

    /// "`<instance>` will run when `<phrase>`" for a stored binding.
    pub async fn describe_rule_binding(&self, rule_binding_id: Uuid) -> Result<String, EngineError> {
        let binding = self
            .store
            .get_rule_binding(rule_binding_id)
            .await?
            .ok_or(EngineError::RuleBindingNotFound(rule_binding_id))?;
        let instance = self.require_action_instance(binding.action_instance_id).await?;
        let event: Event = binding.event.parse()?;
        Ok(describe_binding(&instance.name, event, binding.additional_config.as_ref()))
    }

    pub fn validate_action_config(
        &self,
        kind: &str,
        payload: &Value,
    ) -> Result<ValidationResult, EngineError> {
        let kind: ActionKind = kind.parse()?;
        let schema = &kind.descriptor().config_schema;
        Ok(schemas::validate(schema, &schemas::apply_defaults(schema, payload))?)
    }

    pub fn validate_action_params(
        &self,
        kind: &str,
        payload: &Value,
    ) -> Result<ValidationResult, EngineError> {
        let kind: ActionKind = kind.parse()?;
        let schema = &kind.descriptor().params_schema;
        Ok(schemas::validate(schema, &schemas::apply_defaults(schema, payload))?)
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub(crate) async fn require_pub(&self, id: Uuid) -> Result<PubRow, EngineError> {
        self.store.get_pub(id).await?.ok_or(EngineError::PubNotFound(id))
    }

    pub(crate) async fn require_stage(&self, id: Uuid) -> Result<StageRow, EngineError> {
        self.store.get_stage(id).await?.ok_or(EngineError::StageNotFound(id))
    }

    pub(crate) async fn require_action_instance(
        &self,
        id: Uuid,
    ) -> Result<ActionInstanceRow, EngineError> {
        self.store
            .get_action_instance(id)
            .await?
            .ok_or(EngineError::ActionInstanceNotFound(id))
    }
}

/// One invocation per bound instance, in instance order.
fn plan(
    instances: Vec<ActionInstanceRow>,
    pub_row: &PubRow,
    trigger: Trigger,
    cascade_depth: u32,
) -> Vec<Invocation> {
    instances
        .into_iter()
        .map(|instance| Invocation {
            instance,
            pub_row: pub_row.clone(),
            trigger,
            params: Value::Null,
            cascade_depth,
        })
        .collect()
}

pub(crate) fn ensure_community(community_id: Uuid, stage: &StageRow) -> Result<(), EngineError> {
    if stage.community_id == community_id {
        Ok(())
    } else {
        Err(EngineError::CommunityMismatch { what: "stage", id: stage.id })
    }
}
