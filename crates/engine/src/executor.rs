//! The action-invocation path shared by moves, manual runs and the
//! scheduler.
//!
//! Each invocation:
//! 1. Claims its dedup key (exactly-once across workers).
//! 2. Resolves the action kind, then validates config and params against
//!    the kind's schemas with defaults applied.
//! 3. Runs the action under the configured deadline.
//! 4. Appends an `action_runs` row and settles the claim.
//!
//! Failures at any step become an [`ActionOutcome::Failed`]; nothing here
//! propagates to the caller.

use chrono::Duration as ChronoDuration;
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use actions::{ActionContext, ActionKind};
use db::models::{ActionInstanceRow, ActionRunRow, ClaimStatus, PubRow};
use db::ClaimRequest;
use schemas::{apply_defaults, validate};

use crate::error::InvocationError;
use crate::models::{ActionOutcome, InvocationReport, SkipReason, Trigger};
use crate::WorkflowEngine;

/// Everything needed to invoke one action instance for one pub.
#[derive(Debug, Clone)]
pub(crate) struct Invocation {
    pub instance: ActionInstanceRow,
    pub pub_row: PubRow,
    pub trigger: Trigger,
    pub params: Value,
    pub cascade_depth: u32,
}

/// Fill schema defaults into `payload` and validate the result.
pub(crate) fn resolve_payload(schema: &Value, payload: &Value) -> Result<Value, String> {
    let filled = apply_defaults(schema, payload);
    let result = validate(schema, &filled).map_err(|e| e.to_string())?;
    if result.is_valid() {
        Ok(filled)
    } else {
        Err(result.summary())
    }
}

impl WorkflowEngine {
    #[instrument(
        skip(self, invocation),
        fields(
            action_instance_id = %invocation.instance.id,
            pub_id = %invocation.pub_row.id,
            trigger = %invocation.trigger,
        )
    )]
    pub(crate) async fn invoke(&self, invocation: Invocation) -> InvocationReport {
        let dedup_key = invocation
            .trigger
            .dedup_key(invocation.instance.id, invocation.pub_row.id);

        let outcome = match self.claim(&dedup_key).await {
            Ok(true) => {
                let result = self.execute(&invocation, &dedup_key).await;
                self.record(&invocation, &dedup_key, &result).await;
                match result {
                    Ok(output) => ActionOutcome::Succeeded { output },
                    Err(error) => ActionOutcome::Failed { error },
                }
            }
            Ok(false) => {
                let reason = self.skip_reason(&dedup_key).await;
                warn!(%dedup_key, ?reason, "invocation deduplicated");
                ActionOutcome::Skipped { reason }
            }
            Err(error) => {
                error!(%dedup_key, %error, "could not claim invocation");
                ActionOutcome::Failed { error }
            }
        };

        InvocationReport {
            action_instance_id: invocation.instance.id,
            action_instance_name: invocation.instance.name.clone(),
            action: invocation.instance.action.clone(),
            event: invocation.trigger.event(),
            dedup_key,
            outcome,
        }
    }

    async fn claim(&self, dedup_key: &str) -> Result<bool, InvocationError> {
        let now = self.clock.now();
        let lease = ChronoDuration::from_std(self.config.claim_lease)
            .unwrap_or_else(|_| ChronoDuration::days(1));
        let request = ClaimRequest {
            dedup_key: dedup_key.to_owned(),
            now,
            stale_before: now - lease,
            max_attempts: self.max_attempts(),
        };
        self.store
            .claim_run(request)
            .await
            .map_err(|e| InvocationError::Storage(e.to_string()))
    }

    pub(crate) fn max_attempts(&self) -> i32 {
        i32::try_from(self.config.max_attempts).unwrap_or(i32::MAX)
    }

    async fn skip_reason(&self, dedup_key: &str) -> SkipReason {
        match self.store.get_claim(dedup_key).await {
            Ok(Some(claim)) => match claim.status() {
                Some(ClaimStatus::Succeeded) => SkipReason::AlreadySucceeded,
                Some(ClaimStatus::Failed) => SkipReason::AttemptsExhausted,
                Some(ClaimStatus::Abandoned) => SkipReason::FailedPermanently,
                Some(ClaimStatus::Claimed) | None => SkipReason::InProgress,
            },
            _ => SkipReason::InProgress,
        }
    }

    async fn execute(
        &self,
        invocation: &Invocation,
        dedup_key: &str,
    ) -> Result<Value, InvocationError> {
        let instance = &invocation.instance;
        let kind: ActionKind = instance
            .action
            .parse()
            .map_err(|e: actions::UnknownActionKind| InvocationError::UnknownActionKind(e.0))?;
        let descriptor = kind.descriptor();

        let config = resolve_payload(&descriptor.config_schema, &instance.config)
            .map_err(InvocationError::ConfigValidation)?;
        let params = resolve_payload(&descriptor.params_schema, &invocation.params)
            .map_err(InvocationError::ParamsValidation)?;

        let ctx = ActionContext {
            action_instance_id: instance.id,
            action_instance_name: instance.name.clone(),
            community_id: instance.community_id,
            stage_id: instance.stage_id,
            pub_row: invocation.pub_row.clone(),
            config,
            params,
            dedup_key: dedup_key.to_owned(),
            cascade_depth: invocation.cascade_depth,
            services: self.services.clone(),
        };

        match tokio::time::timeout(self.config.action_timeout, kind.run(&ctx)).await {
            Ok(result) => result.map_err(InvocationError::from),
            Err(_) => Err(InvocationError::Timeout(self.config.action_timeout)),
        }
    }

    /// Append the run log entry and settle the claim. A non-retryable
    /// failure abandons the claim so no later pass attempts it again.
    /// Storage failures are logged; an unsettled claim goes stale and
    /// becomes claimable again.
    async fn record(
        &self,
        invocation: &Invocation,
        dedup_key: &str,
        result: &Result<Value, InvocationError>,
    ) {
        let now = self.clock.now();
        let success = result.is_ok();
        let run = ActionRunRow {
            id: Uuid::new_v4(),
            action_instance_id: invocation.instance.id,
            pub_id: invocation.pub_row.id,
            event: invocation.trigger.event().map(|e| e.as_str().to_owned()),
            dedup_key: dedup_key.to_owned(),
            success,
            output: result.as_ref().ok().cloned(),
            error: result.as_ref().err().map(ToString::to_string),
            params: invocation.params.clone(),
            created_at: now,
        };

        let status = match result {
            Ok(_) => {
                info!(%dedup_key, action = %invocation.instance.action, "action succeeded");
                ClaimStatus::Succeeded
            }
            Err(e) if e.is_retryable() => {
                warn!(%dedup_key, error = %e, "action failed; eligible for retry");
                ClaimStatus::Failed
            }
            Err(e) => {
                warn!(%dedup_key, error = %e, "action failed permanently");
                ClaimStatus::Abandoned
            }
        };

        if let Err(e) = self.store.insert_action_run(run).await {
            error!(%dedup_key, error = %e, "failed to record action run");
        }
        if let Err(e) = self.store.finish_claim(dedup_key, status, now).await {
            error!(%dedup_key, error = %e, "failed to settle claim");
        }
    }
}
