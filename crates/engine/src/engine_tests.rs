//! End-to-end tests for the workflow engine.
//!
//! Everything runs against `MemoryStore`, a `ManualClock` and the recording
//! collaborators from `actions::mock`, so no database or network is needed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use actions::mock::{MockBehaviour, MockServices};
use db::models::{
    ActionInstanceRow, ActionRunClaimRow, ActionRunRow, ClaimStatus, MoveConstraintRow,
    PubInStageRow, PubRow, PubTypeRow, RuleBindingRow, StageRow,
};
use db::{ClaimRequest, DbError, MemoryStore, Store};
use schemas::CoreSchemaType;

use crate::{
    ActionOutcome, EngineConfig, EngineError, Event, InvocationError, ManualClock, SkipReason,
    WorkflowEngine,
};

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

struct Fixture {
    engine: Arc<WorkflowEngine>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    mocks: MockServices,
    community: Uuid,
    pub_type: Uuid,
}

impl Fixture {
    async fn new() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    async fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mocks = MockServices::new();
        let engine = WorkflowEngine::new(store.clone(), clock.clone(), mocks.integrations(), config);

        let community = Uuid::new_v4();
        let fields = BTreeMap::from([("title".to_string(), CoreSchemaType::String)]);
        let pub_type = engine
            .create_pub_type(community, "Article", fields)
            .await
            .unwrap()
            .id;

        Self { engine, store, clock, mocks, community, pub_type }
    }

    async fn stage(&self, name: &str) -> Uuid {
        self.engine.create_stage(self.community, name).await.unwrap().id
    }

    async fn edge(&self, from: Uuid, to: Uuid) {
        assert!(self.engine.add_constraint(from, to).await.unwrap());
    }

    async fn new_pub(&self, title: &str) -> Uuid {
        self.engine
            .create_pub(self.community, self.pub_type, json!({ "title": title }))
            .await
            .unwrap()
            .id
    }

    /// An email instance on `stage` bound to `event`.
    async fn notify(&self, stage: Uuid, event: Event, subject: &str) -> Uuid {
        let config = json!({
            "recipient": "editor@example.org",
            "subject": subject,
            "body": "{{pub.values.title}}"
        });
        let instance = self
            .engine
            .create_action_instance(stage, "email", "Notify editors", config)
            .await
            .unwrap();
        self.engine
            .create_rule_binding(instance.id, event.as_str(), None)
            .await
            .unwrap();
        instance.id
    }

    async fn stages_of(&self, pub_id: Uuid) -> Vec<Uuid> {
        self.store
            .list_pub_stages(pub_id)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.stage_id)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Stage graph
// ---------------------------------------------------------------------------

#[tokio::test]
async fn can_move_flips_with_the_constraint() {
    let f = Fixture::new().await;
    let (a, b) = (f.stage("A").await, f.stage("B").await);

    assert!(!f.engine.can_move(f.community, Some(a), b).await.unwrap());
    f.edge(a, b).await;
    assert!(f.engine.can_move(f.community, Some(a), b).await.unwrap());
    assert!(!f.engine.can_move(Uuid::new_v4(), Some(a), b).await.unwrap());
    assert!(f.engine.remove_constraint(a, b).await.unwrap());
    assert!(!f.engine.can_move(f.community, Some(a), b).await.unwrap());
    assert!(f.engine.can_move(f.community, None, b).await.unwrap());
}

#[tokio::test]
async fn constraints_cannot_cross_communities() {
    let f = Fixture::new().await;
    let a = f.stage("A").await;
    let foreign = f.engine.create_stage(Uuid::new_v4(), "Elsewhere").await.unwrap().id;

    let err = f.engine.add_constraint(a, foreign).await.unwrap_err();
    assert!(matches!(err, EngineError::CommunityMismatch { .. }));
}

#[tokio::test]
async fn reachable_and_destinations_follow_cycles() {
    let f = Fixture::new().await;
    let (a, b, c) = (f.stage("A").await, f.stage("B").await, f.stage("C").await);
    f.edge(a, b).await;
    f.edge(b, c).await;
    f.edge(c, b).await;

    assert_eq!(f.engine.destinations_of(b).await.unwrap().into_iter().collect::<Vec<_>>(), vec![c]);
    assert_eq!(f.engine.reachable_from(a).await.unwrap(), vec![b, c]);
}

// ---------------------------------------------------------------------------
// Moves and rule firing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submitted_evaluating_published_scenario() {
    let f = Fixture::new().await;
    let submitted = f.stage("Submitted").await;
    let evaluating = f.stage("Evaluating").await;
    let published = f.stage("Published").await;
    f.edge(submitted, evaluating).await;
    f.edge(evaluating, published).await;
    f.edge(evaluating, evaluating).await;
    f.notify(evaluating, Event::PubEnteredStage, "Ready for review").await;

    let p = f.new_pub("On Growth").await;
    f.engine.move_pub(p, None, submitted).await.unwrap();
    assert_eq!(f.mocks.notifier.call_count(), 0);

    let moved = f.engine.move_pub(p, Some(submitted), evaluating).await.unwrap();
    assert_eq!(moved.entered.len(), 1);
    assert!(matches!(moved.entered[0].outcome, ActionOutcome::Succeeded { .. }));
    assert_eq!(f.mocks.notifier.call_count(), 1);
    assert_eq!(f.mocks.notifier.sent()[0].body, "On Growth");

    f.engine.move_pub(p, Some(evaluating), evaluating).await.unwrap();
    assert_eq!(f.mocks.notifier.call_count(), 2);

    // Re-entry minted a fresh occupancy, so the two runs have distinct keys.
    let keys: Vec<String> = f.mocks.notifier.sent().into_iter().map(|e| e.idempotency_key).collect();
    assert_ne!(keys[0], keys[1]);

    let p2 = f.new_pub("Second").await;
    f.engine.move_pub(p2, None, submitted).await.unwrap();
    let err = f.engine.move_pub(p2, Some(submitted), published).await.unwrap_err();
    assert!(matches!(err, EngineError::IllegalTransition { .. }));
    assert_eq!(f.stages_of(p2).await, vec![submitted]);
    assert_eq!(f.mocks.notifier.call_count(), 2);
}

#[tokio::test]
async fn illegal_transition_changes_nothing_and_fires_nothing() {
    let f = Fixture::new().await;
    let (a, b) = (f.stage("A").await, f.stage("B").await);
    f.notify(a, Event::PubLeftStage, "left").await;
    f.notify(b, Event::PubEnteredStage, "entered").await;

    let p = f.new_pub("P").await;
    f.engine.move_pub(p, None, a).await.unwrap();

    let err = f.engine.move_pub(p, Some(a), b).await.unwrap_err();
    assert!(matches!(err, EngineError::IllegalTransition { from, to } if from == a && to == b));
    assert_eq!(f.stages_of(p).await, vec![a]);
    assert_eq!(f.mocks.notifier.call_count(), 0);
    assert!(f.engine.list_action_runs(p).await.unwrap().is_empty());
}

#[tokio::test]
async fn left_rules_fire_before_entered_rules() {
    let f = Fixture::new().await;
    let (a, b) = (f.stage("A").await, f.stage("B").await);
    f.edge(a, b).await;
    f.notify(a, Event::PubLeftStage, "left A").await;
    f.notify(b, Event::PubEnteredStage, "entered B").await;

    let p = f.new_pub("P").await;
    f.engine.move_pub(p, None, a).await.unwrap();
    let moved = f.engine.move_pub(p, Some(a), b).await.unwrap();

    assert_eq!(moved.left.len(), 1);
    assert_eq!(moved.entered.len(), 1);
    let subjects: Vec<String> = f.mocks.notifier.sent().into_iter().map(|e| e.subject).collect();
    assert_eq!(subjects, vec!["left A", "entered B"]);
}

#[tokio::test]
async fn moving_from_an_unoccupied_stage_is_rejected() {
    let f = Fixture::new().await;
    let (a, b) = (f.stage("A").await, f.stage("B").await);
    f.edge(a, b).await;
    let p = f.new_pub("P").await;

    let err = f.engine.move_pub(p, Some(a), b).await.unwrap_err();
    assert!(matches!(err, EngineError::NotInStage { .. }));
    assert!(f.stages_of(p).await.is_empty());
}

#[tokio::test]
async fn placing_a_pub_twice_in_one_stage_is_rejected() {
    let f = Fixture::new().await;
    let a = f.stage("A").await;
    let p = f.new_pub("P").await;
    f.engine.move_pub(p, None, a).await.unwrap();

    let err = f.engine.move_pub(p, None, a).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyInStage { .. }));
}

#[tokio::test]
async fn a_pub_may_occupy_several_stages() {
    let f = Fixture::new().await;
    let (a, b) = (f.stage("A").await, f.stage("B").await);
    f.notify(b, Event::PubEnteredStage, "entered B").await;
    let p = f.new_pub("P").await;

    f.engine.move_pub(p, None, a).await.unwrap();
    f.engine.move_pub(p, None, b).await.unwrap();

    let mut stages = f.stages_of(p).await;
    stages.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(stages, expected);
    assert_eq!(f.mocks.notifier.call_count(), 1);
}

#[tokio::test]
async fn unconstrained_placement_ignores_the_graph_and_keeps_other_stages() {
    let f = Fixture::new().await;
    let (submitted, published) = (f.stage("Submitted").await, f.stage("Published").await);
    f.notify(submitted, Event::PubLeftStage, "left Submitted").await;
    let p = f.new_pub("P").await;
    f.engine.move_pub(p, None, submitted).await.unwrap();

    let err = f.engine.move_pub(p, Some(submitted), published).await.unwrap_err();
    assert!(matches!(err, EngineError::IllegalTransition { .. }));

    let moved = f.engine.move_pub(p, None, published).await.unwrap();
    assert!(moved.left.is_empty());
    let mut stages = f.stages_of(p).await;
    stages.sort();
    let mut expected = vec![submitted, published];
    expected.sort();
    assert_eq!(stages, expected);
    assert_eq!(f.mocks.notifier.call_count(), 0);
}

#[tokio::test]
async fn concurrent_moves_of_different_pubs_fire_once_each() {
    let f = Fixture::new().await;
    let (a, b) = (f.stage("A").await, f.stage("B").await);
    f.edge(a, b).await;
    f.notify(b, Event::PubEnteredStage, "entered B").await;

    let (p1, p2) = (f.new_pub("One").await, f.new_pub("Two").await);
    f.engine.move_pub(p1, None, a).await.unwrap();
    f.engine.move_pub(p2, None, a).await.unwrap();

    let (e1, e2) = (f.engine.clone(), f.engine.clone());
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { e1.move_pub(p1, Some(a), b).await }),
        tokio::spawn(async move { e2.move_pub(p2, Some(a), b).await }),
    );
    r1.unwrap().unwrap();
    r2.unwrap().unwrap();

    assert_eq!(f.mocks.notifier.call_count(), 2);
    assert_eq!(f.engine.list_action_runs(p1).await.unwrap().len(), 1);
    assert_eq!(f.engine.list_action_runs(p2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_moves_of_one_pub_are_serialised() {
    let f = Fixture::new().await;
    let (a, b) = (f.stage("A").await, f.stage("B").await);
    f.edge(a, b).await;
    f.notify(b, Event::PubEnteredStage, "entered B").await;

    let p = f.new_pub("P").await;
    f.engine.move_pub(p, None, a).await.unwrap();

    let (e1, e2) = (f.engine.clone(), f.engine.clone());
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { e1.move_pub(p, Some(a), b).await }),
        tokio::spawn(async move { e2.move_pub(p, Some(a), b).await }),
    );
    let results = [r1.unwrap(), r2.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(EngineError::NotInStage { .. }))));
    assert_eq!(f.stages_of(p).await, vec![b]);
    assert_eq!(f.mocks.notifier.call_count(), 1);
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_config_skips_only_that_action() {
    let f = Fixture::new().await;
    let a = f.stage("A").await;

    // Stored config that no longer satisfies the email schema.
    let now = Utc::now();
    let broken = f
        .store
        .insert_action_instance(ActionInstanceRow {
            id: Uuid::new_v4(),
            community_id: f.community,
            stage_id: a,
            action: "email".into(),
            name: "Broken email".into(),
            config: json!({ "subject": "no recipient" }),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    f.engine
        .create_rule_binding(broken.id, "pubEnteredStage", None)
        .await
        .unwrap();
    let log = f
        .engine
        .create_action_instance(a, "log", "Log entry", json!({ "text": "{{pub.values.title}}" }))
        .await
        .unwrap();
    f.engine
        .create_rule_binding(log.id, "pubEnteredStage", None)
        .await
        .unwrap();

    let p = f.new_pub("P").await;
    let moved = f.engine.move_pub(p, None, a).await.unwrap();

    assert_eq!(moved.attempted(), 2);
    assert_eq!(moved.failed(), 1);
    assert_eq!(moved.summary(), "move succeeded, but 1 of 2 configured actions failed");

    let failed = moved
        .entered
        .iter()
        .find(|r| r.action_instance_id == broken.id)
        .unwrap();
    assert!(matches!(
        failed.outcome,
        ActionOutcome::Failed { error: InvocationError::ConfigValidation(_) }
    ));

    let runs = f.engine.list_action_runs(p).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs.iter().filter(|r| !r.success).count(), 1);
    assert_eq!(f.stages_of(p).await, vec![a]);
}

#[tokio::test]
async fn action_failure_does_not_abort_the_move() {
    let f = Fixture::new().await;
    let a = f.stage("A").await;
    f.notify(a, Event::PubEnteredStage, "entered").await;
    f.mocks.notifier.set_behaviour(MockBehaviour::FailFatal("mailbox full".into()));

    let p = f.new_pub("P").await;
    let moved = f.engine.move_pub(p, None, a).await.unwrap();

    assert_eq!(moved.failed(), 1);
    assert_eq!(f.stages_of(p).await, vec![a]);
    let run = &f.engine.list_action_runs(p).await.unwrap()[0];
    assert!(!run.success);
    assert!(run.error.as_deref().unwrap().contains("mailbox full"));
}

#[tokio::test(start_paused = true)]
async fn timed_out_entered_action_is_retried_by_a_later_sweep() {
    let config = EngineConfig {
        action_timeout: Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let f = Fixture::with_config(config).await;
    let a = f.stage("A").await;
    f.notify(a, Event::PubEnteredStage, "entered").await;
    f.mocks.notifier.set_delay(Duration::from_secs(5));

    let p = f.new_pub("P").await;
    let moved = f.engine.move_pub(p, None, a).await.unwrap();

    let report = &moved.entered[0];
    assert!(matches!(report.outcome, ActionOutcome::Failed { error: InvocationError::Timeout(_) }));

    let claim = f.store.get_claim(&report.dedup_key).await.unwrap().unwrap();
    assert_eq!(claim.status(), Some(ClaimStatus::Failed));
    assert!(!f.store.has_successful_run(&report.dedup_key).await.unwrap());

    let runs = f.engine.list_action_runs(p).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].error.as_deref().unwrap().contains("timed out"));

    f.mocks.notifier.set_delay(Duration::ZERO);
    let retries = f.engine.retryable_entered_invocations().await.unwrap();
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].dedup_key(), report.dedup_key);
    let second = f.engine.fire_due(retries[0].clone()).await.unwrap();
    assert!(matches!(second.outcome, ActionOutcome::Succeeded { .. }));

    assert!(f.store.has_successful_run(&report.dedup_key).await.unwrap());
    assert!(f.engine.retryable_entered_invocations().await.unwrap().is_empty());
}

#[tokio::test]
async fn entered_retry_is_dropped_once_the_pub_moves_on() {
    let f = Fixture::new().await;
    let (a, b) = (f.stage("A").await, f.stage("B").await);
    f.edge(a, b).await;
    f.notify(a, Event::PubEnteredStage, "entered").await;
    f.mocks.notifier.set_behaviour(MockBehaviour::FailRetryable("smtp down".into()));

    let p = f.new_pub("P").await;
    f.engine.move_pub(p, None, a).await.unwrap();
    assert_eq!(f.engine.retryable_entered_invocations().await.unwrap().len(), 1);

    f.engine.move_pub(p, Some(a), b).await.unwrap();
    assert!(f.engine.retryable_entered_invocations().await.unwrap().is_empty());
}

#[tokio::test]
async fn fatal_failure_abandons_the_claim() {
    let f = Fixture::new().await;
    let a = f.stage("A").await;
    f.notify(a, Event::PubEnteredStage, "entered").await;
    f.mocks.notifier.set_behaviour(MockBehaviour::FailFatal("no such mailbox".into()));

    let p = f.new_pub("P").await;
    let moved = f.engine.move_pub(p, None, a).await.unwrap();
    let key = &moved.entered[0].dedup_key;

    let claim = f.store.get_claim(key).await.unwrap().unwrap();
    assert_eq!(claim.status(), Some(ClaimStatus::Abandoned));
    assert!(f.engine.retryable_entered_invocations().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Duration rules
// ---------------------------------------------------------------------------

async fn duration_fixture() -> (Fixture, Uuid, Uuid) {
    let f = Fixture::new().await;
    let (a, b) = (f.stage("A").await, f.stage("B").await);
    f.edge(a, b).await;
    let instance = f
        .engine
        .create_action_instance(
            a,
            "email",
            "Nudge reviewers",
            json!({ "recipient": "editor@example.org", "subject": "Still waiting", "body": "b" }),
        )
        .await
        .unwrap();
    f.engine
        .create_rule_binding(
            instance.id,
            "pubInStageForDuration",
            Some(json!({ "duration": 24, "interval": "hour" })),
        )
        .await
        .unwrap();
    (f, a, b)
}

#[tokio::test]
async fn duration_rule_fires_once_after_threshold() {
    let (f, a, _) = duration_fixture().await;
    let p = f.new_pub("P").await;
    f.engine.move_pub(p, None, a).await.unwrap();

    f.clock.advance(ChronoDuration::hours(23) + ChronoDuration::minutes(59));
    assert!(f.engine.due_duration_invocations().await.unwrap().is_empty());

    f.clock.advance(ChronoDuration::minutes(1));
    let due = f.engine.due_duration_invocations().await.unwrap();
    assert_eq!(due.len(), 1);

    // Two passes racing on the same occupancy.
    let (r1, r2) = tokio::join!(
        f.engine.fire_due(due[0].clone()),
        f.engine.fire_due(due[0].clone()),
    );
    let outcomes = [r1.unwrap().outcome, r2.unwrap().outcome];
    assert_eq!(
        outcomes.iter().filter(|o| matches!(o, ActionOutcome::Succeeded { .. })).count(),
        1
    );
    assert_eq!(f.mocks.notifier.call_count(), 1);

    // A later pass finds nothing left to do.
    f.clock.advance(ChronoDuration::hours(5));
    assert!(f.engine.due_duration_invocations().await.unwrap().is_empty());
    assert_eq!(f.engine.list_action_runs(p).await.unwrap().len(), 1);
}

#[tokio::test]
async fn duration_rule_never_fires_for_an_ended_occupancy() {
    let (f, a, b) = duration_fixture().await;
    let p = f.new_pub("P").await;
    f.engine.move_pub(p, None, a).await.unwrap();

    f.clock.advance(ChronoDuration::hours(12));
    f.engine.move_pub(p, Some(a), b).await.unwrap();
    f.clock.advance(ChronoDuration::days(3));

    assert!(f.engine.due_duration_invocations().await.unwrap().is_empty());
    assert_eq!(f.mocks.notifier.call_count(), 0);
}

#[tokio::test]
async fn due_item_for_a_departed_pub_is_skipped() {
    let (f, a, b) = duration_fixture().await;
    let p = f.new_pub("P").await;
    f.engine.move_pub(p, None, a).await.unwrap();
    f.clock.advance(ChronoDuration::days(2));

    let due = f.engine.due_duration_invocations().await.unwrap();
    f.engine.move_pub(p, Some(a), b).await.unwrap();

    let report = f.engine.fire_due(due[0].clone()).await.unwrap();
    assert_eq!(report.outcome, ActionOutcome::Skipped { reason: SkipReason::NoLongerInStage });
    assert_eq!(f.mocks.notifier.call_count(), 0);
}

#[tokio::test]
async fn failed_duration_run_is_retried_on_a_later_pass() {
    let (f, a, _) = duration_fixture().await;
    let p = f.new_pub("P").await;
    f.engine.move_pub(p, None, a).await.unwrap();
    f.clock.advance(ChronoDuration::days(1));

    f.mocks.notifier.set_behaviour(MockBehaviour::FailRetryable("smtp down".into()));
    let due = f.engine.due_duration_invocations().await.unwrap();
    let first = f.engine.fire_due(due[0].clone()).await.unwrap();
    assert!(first.outcome.is_failure());

    f.mocks.notifier.set_behaviour(MockBehaviour::Succeed);
    let due = f.engine.due_duration_invocations().await.unwrap();
    assert_eq!(due.len(), 1);
    let second = f.engine.fire_due(due[0].clone()).await.unwrap();
    assert!(matches!(second.outcome, ActionOutcome::Succeeded { .. }));
    assert_eq!(first.dedup_key, second.dedup_key);

    assert!(f.engine.due_duration_invocations().await.unwrap().is_empty());
}

#[tokio::test]
async fn fatal_duration_failure_is_attempted_once() {
    let (f, a, _) = duration_fixture().await;
    let p = f.new_pub("P").await;
    f.engine.move_pub(p, None, a).await.unwrap();
    f.clock.advance(ChronoDuration::days(1));
    f.mocks.notifier.set_behaviour(MockBehaviour::FailFatal("no such mailbox".into()));

    for _ in 0..3 {
        for due in f.engine.due_duration_invocations().await.unwrap() {
            f.engine.fire_due(due).await.unwrap();
        }
        f.clock.advance(ChronoDuration::hours(1));
    }

    assert_eq!(f.mocks.notifier.call_count(), 1);
    assert_eq!(f.engine.list_action_runs(p).await.unwrap().len(), 1);
}

#[tokio::test]
async fn out_of_range_duration_is_skipped_by_the_scan() {
    let (f, a, _) = duration_fixture().await;
    let instance = f.engine.list_action_instances(f.community).await.unwrap()[0].id;
    // Written straight to the store, as an older release might have.
    f.store
        .insert_rule_binding(RuleBindingRow {
            id: Uuid::new_v4(),
            event: Event::PubInStageForDuration.as_str().into(),
            action_instance_id: instance,
            additional_config: Some(json!({ "duration": 1_000_000, "interval": "year" })),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let p = f.new_pub("P").await;
    f.engine.move_pub(p, None, a).await.unwrap();
    f.clock.advance(ChronoDuration::days(1));

    // Only the well-formed 24 hour binding comes due.
    let due = f.engine.due_duration_invocations().await.unwrap();
    assert_eq!(due.len(), 1);
}

#[tokio::test]
async fn orphaned_duration_binding_is_inert() {
    let (f, a, _) = duration_fixture().await;
    let p = f.new_pub("P").await;
    f.engine.move_pub(p, None, a).await.unwrap();

    // Delete the instance behind the engine's back, leaving its binding.
    let instance = f.engine.list_action_instances(f.community).await.unwrap()[0].id;
    assert!(f.store.delete_action_instance(instance).await.unwrap());

    f.clock.advance(ChronoDuration::days(2));
    assert!(f.engine.due_duration_invocations().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Move action and manual runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn move_action_reenters_the_engine() {
    let f = Fixture::new().await;
    let (a, b) = (f.stage("Intake").await, f.stage("Review").await);
    f.edge(a, b).await;
    let mover = f
        .engine
        .create_action_instance(a, "move", "Forward", json!({ "stage": b.to_string() }))
        .await
        .unwrap();
    f.engine
        .create_rule_binding(mover.id, "pubEnteredStage", None)
        .await
        .unwrap();
    f.notify(b, Event::PubEnteredStage, "arrived").await;

    let p = f.new_pub("P").await;
    let moved = f.engine.move_pub(p, None, a).await.unwrap();

    assert!(matches!(moved.entered[0].outcome, ActionOutcome::Succeeded { .. }));
    assert_eq!(f.stages_of(p).await, vec![b]);
    assert_eq!(f.mocks.notifier.call_count(), 1);
}

#[tokio::test]
async fn move_cascades_stop_at_the_depth_limit() {
    let config = EngineConfig { max_cascade_depth: 3, ..EngineConfig::default() };
    let f = Fixture::with_config(config).await;
    let (a, b) = (f.stage("Ping").await, f.stage("Pong").await);
    f.edge(a, b).await;
    f.edge(b, a).await;
    for (from, to) in [(a, b), (b, a)] {
        let instance = f
            .engine
            .create_action_instance(from, "move", "Bounce", json!({ "stage": to.to_string() }))
            .await
            .unwrap();
        f.engine
            .create_rule_binding(instance.id, "pubEnteredStage", None)
            .await
            .unwrap();
    }

    let p = f.new_pub("P").await;
    f.engine.move_pub(p, None, a).await.unwrap();

    // Depths 0..=3 succeed (Ping, Pong, Ping, Pong); the next bounce fails.
    assert_eq!(f.stages_of(p).await, vec![b]);
    let runs = f.engine.list_action_runs(p).await.unwrap();
    assert_eq!(runs.len(), 4);
    assert_eq!(runs.iter().filter(|r| !r.success).count(), 1);
    assert!(runs
        .iter()
        .any(|r| r.error.as_deref().is_some_and(|e| e.contains("cascade"))));
}

#[tokio::test]
async fn manual_runs_validate_params_and_never_dedupe() {
    let f = Fixture::new().await;
    let a = f.stage("A").await;
    let instance = f.notify(a, Event::PubEnteredStage, "hello").await;
    let p = f.new_pub("P").await;

    let err = f
        .engine
        .run_action_manually(instance, p, json!({ "recipient": "not an address" }))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ParamsValidation { .. }));
    assert_eq!(f.mocks.notifier.call_count(), 0);

    for _ in 0..2 {
        let report = f
            .engine
            .run_action_manually(instance, p, json!({ "recipient": "author@example.org" }))
            .await
            .unwrap();
        assert!(matches!(report.outcome, ActionOutcome::Succeeded { .. }));
        assert_eq!(report.event, None);
    }
    assert_eq!(f.mocks.notifier.call_count(), 2);
    assert_eq!(f.mocks.notifier.sent()[0].to, "author@example.org");

    let runs = f.engine.list_action_runs(p).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].params, json!({ "recipient": "author@example.org" }));
}

// ---------------------------------------------------------------------------
// Configuration-time validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn configuration_errors_surface_at_configuration_time() {
    let f = Fixture::new().await;
    let a = f.stage("A").await;

    let err = f
        .engine
        .create_action_instance(a, "sms", "Text", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownActionKind(_)));

    let err = f
        .engine
        .create_action_instance(a, "http", "Hook", json!({ "url": "https://example.org", "method": "BREW" }))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ConfigValidation { .. }));

    let instance = f.notify(a, Event::PubEnteredStage, "s").await;

    let err = f
        .engine
        .create_rule_binding(instance, "pubArchived", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownEventKind(_)));

    let err = f
        .engine
        .create_rule_binding(instance, "pubEnteredStage", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateBinding { .. }));

    let err = f
        .engine
        .create_rule_binding(instance, "pubInStageForDuration", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RuleConfigValidation { .. }));

    let err = f
        .engine
        .create_rule_binding(instance, "pubLeftStage", Some(json!({ "duration": 1 })))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RuleConfigValidation { .. }));
}

#[tokio::test]
async fn duration_bindings_need_a_whole_in_range_count() {
    let f = Fixture::new().await;
    let a = f.stage("A").await;
    let instance = f.notify(a, Event::PubEnteredStage, "s").await;

    for config in [
        json!({ "duration": 1.5, "interval": "hour" }),
        json!({ "duration": 1_000_000, "interval": "year" }),
        json!({ "duration": 0, "interval": "day" }),
    ] {
        let err = f
            .engine
            .create_rule_binding(instance, "pubInStageForDuration", Some(config))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RuleConfigValidation { .. }));
    }

    f.engine
        .create_rule_binding(
            instance,
            "pubInStageForDuration",
            Some(json!({ "duration": 10_000, "interval": "year" })),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn pub_values_are_checked_against_the_pub_type() {
    let f = Fixture::new().await;
    let err = f
        .engine
        .create_pub(f.community, f.pub_type, json!({ "title": 42 }))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PubValidation(_)));

    let err = f
        .engine
        .create_pub(f.community, f.pub_type, json!({ "abstract": "x" }))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PubValidation(_)));
}

#[tokio::test]
async fn describe_rule_binding_reads_naturally() {
    let (f, _, _) = duration_fixture().await;
    let instance = f.engine.list_action_instances(f.community).await.unwrap()[0].id;
    let binding = f.engine.list_rule_bindings_for_instance(instance).await.unwrap()[0].id;

    assert_eq!(
        f.engine.describe_rule_binding(binding).await.unwrap(),
        "Nudge reviewers will run when a pub stays in this stage for 24 hours"
    );
    assert_eq!(
        f.engine.render_rule_description("pubLeftStage", None).unwrap(),
        "a pub leaves this stage"
    );
}

#[tokio::test]
async fn validate_action_payloads_report_issues() {
    let f = Fixture::new().await;

    let ok = f
        .engine
        .validate_action_config("pdf", &json!({ "pageSize": "Letter" }))
        .unwrap();
    assert!(ok.is_valid());

    let bad = f
        .engine
        .validate_action_config("email", &json!({ "recipient": "x@example.org" }))
        .unwrap();
    assert!(!bad.is_valid());

    let params = f.engine.validate_action_params("http", &json!({ "extra": true })).unwrap();
    assert!(!params.is_valid());

    assert!(f.engine.validate_action_params("nope", &Value::Null).is_err());
}

// ---------------------------------------------------------------------------
// Stage administration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stages_keep_display_order_through_reordering() {
    let f = Fixture::new().await;
    let (a, b, c) = (f.stage("A").await, f.stage("B").await, f.stage("C").await);

    let names = |stages: Vec<db::models::StageRow>| stages.into_iter().map(|s| s.id).collect::<Vec<_>>();
    assert_eq!(names(f.engine.list_stages(f.community).await.unwrap()), vec![a, b, c]);

    f.engine.reorder_stage(c, None).await.unwrap();
    assert_eq!(names(f.engine.list_stages(f.community).await.unwrap()), vec![c, a, b]);

    f.engine.reorder_stage(c, Some(a)).await.unwrap();
    assert_eq!(names(f.engine.list_stages(f.community).await.unwrap()), vec![a, c, b]);
}

#[tokio::test]
async fn occupied_stages_cannot_be_deleted() {
    let f = Fixture::new().await;
    let (a, b) = (f.stage("A").await, f.stage("B").await);
    f.edge(a, b).await;
    let instance = f.notify(a, Event::PubEnteredStage, "s").await;
    let p = f.new_pub("P").await;
    f.engine.move_pub(p, None, a).await.unwrap();

    let err = f.engine.delete_stage(a).await.unwrap_err();
    assert!(matches!(err, EngineError::StageOccupied(_)));

    f.engine.move_pub(p, Some(a), b).await.unwrap();
    f.engine.delete_stage(a).await.unwrap();

    assert!(f.store.get_action_instance(instance).await.unwrap().is_none());
    assert!(f.engine.list_rule_bindings_for_instance(instance).await.unwrap().is_empty());
    assert!(f.engine.destinations_of(a).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Storage failures
// ---------------------------------------------------------------------------

/// A `MemoryStore` whose rule-binding lookups can be switched to fail.
struct FlakyStore {
    inner: MemoryStore,
    fail_binding_lookups: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self { inner: MemoryStore::new(), fail_binding_lookups: AtomicBool::new(false) }
    }

    fn break_binding_lookups(&self) {
        self.fail_binding_lookups.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn insert_stage(&self, stage: StageRow) -> Result<StageRow, DbError> {
        self.inner.insert_stage(stage).await
    }

    async fn get_stage(&self, id: Uuid) -> Result<Option<StageRow>, DbError> {
        self.inner.get_stage(id).await
    }

    async fn list_stages(&self, community_id: Uuid) -> Result<Vec<StageRow>, DbError> {
        self.inner.list_stages(community_id).await
    }

    async fn update_stage_order(&self, id: Uuid, order_key: &str) -> Result<(), DbError> {
        self.inner.update_stage_order(id, order_key).await
    }

    async fn delete_stage(&self, id: Uuid) -> Result<(), DbError> {
        self.inner.delete_stage(id).await
    }

    async fn insert_move_constraint(&self, edge: MoveConstraintRow) -> Result<bool, DbError> {
        self.inner.insert_move_constraint(edge).await
    }

    async fn delete_move_constraint(
        &self,
        stage_id: Uuid,
        destination_id: Uuid,
    ) -> Result<bool, DbError> {
        self.inner.delete_move_constraint(stage_id, destination_id).await
    }

    async fn get_move_constraints(&self, stage_id: Uuid) -> Result<Vec<MoveConstraintRow>, DbError> {
        self.inner.get_move_constraints(stage_id).await
    }

    async fn list_move_constraints(
        &self,
        community_id: Uuid,
    ) -> Result<Vec<MoveConstraintRow>, DbError> {
        self.inner.list_move_constraints(community_id).await
    }

    async fn insert_pub_type(&self, pub_type: PubTypeRow) -> Result<PubTypeRow, DbError> {
        self.inner.insert_pub_type(pub_type).await
    }

    async fn get_pub_type(&self, id: Uuid) -> Result<Option<PubTypeRow>, DbError> {
        self.inner.get_pub_type(id).await
    }

    async fn insert_pub(&self, pub_row: PubRow) -> Result<PubRow, DbError> {
        self.inner.insert_pub(pub_row).await
    }

    async fn get_pub(&self, id: Uuid) -> Result<Option<PubRow>, DbError> {
        self.inner.get_pub(id).await
    }

    async fn list_pub_stages(&self, pub_id: Uuid) -> Result<Vec<PubInStageRow>, DbError> {
        self.inner.list_pub_stages(pub_id).await
    }

    async fn list_stage_occupants(&self, stage_id: Uuid) -> Result<Vec<PubInStageRow>, DbError> {
        self.inner.list_stage_occupants(stage_id).await
    }

    async fn get_pub_in_stage(&self, id: Uuid) -> Result<Option<PubInStageRow>, DbError> {
        self.inner.get_pub_in_stage(id).await
    }

    async fn insert_pub_in_stage(&self, row: PubInStageRow) -> Result<PubInStageRow, DbError> {
        self.inner.insert_pub_in_stage(row).await
    }

    async fn delete_pub_in_stage(
        &self,
        pub_id: Uuid,
        stage_id: Uuid,
    ) -> Result<Option<PubInStageRow>, DbError> {
        self.inner.delete_pub_in_stage(pub_id, stage_id).await
    }

    async fn replace_pub_in_stage(
        &self,
        from_stage_id: Option<Uuid>,
        row: PubInStageRow,
    ) -> Result<Option<PubInStageRow>, DbError> {
        self.inner.replace_pub_in_stage(from_stage_id, row).await
    }

    async fn insert_action_instance(
        &self,
        instance: ActionInstanceRow,
    ) -> Result<ActionInstanceRow, DbError> {
        self.inner.insert_action_instance(instance).await
    }

    async fn get_action_instance(&self, id: Uuid) -> Result<Option<ActionInstanceRow>, DbError> {
        self.inner.get_action_instance(id).await
    }

    async fn update_action_instance_config(
        &self,
        id: Uuid,
        config: Value,
        updated_at: DateTime<Utc>,
    ) -> Result<ActionInstanceRow, DbError> {
        self.inner.update_action_instance_config(id, config, updated_at).await
    }

    async fn delete_action_instance(&self, id: Uuid) -> Result<bool, DbError> {
        self.inner.delete_action_instance(id).await
    }

    async fn get_action_instances_for_stage(
        &self,
        stage_id: Uuid,
    ) -> Result<Vec<ActionInstanceRow>, DbError> {
        self.inner.get_action_instances_for_stage(stage_id).await
    }

    async fn list_action_instances(
        &self,
        community_id: Uuid,
    ) -> Result<Vec<ActionInstanceRow>, DbError> {
        self.inner.list_action_instances(community_id).await
    }

    async fn insert_rule_binding(&self, binding: RuleBindingRow) -> Result<RuleBindingRow, DbError> {
        self.inner.insert_rule_binding(binding).await
    }

    async fn get_rule_binding(&self, id: Uuid) -> Result<Option<RuleBindingRow>, DbError> {
        self.inner.get_rule_binding(id).await
    }

    async fn delete_rule_binding(&self, id: Uuid) -> Result<bool, DbError> {
        self.inner.delete_rule_binding(id).await
    }

    async fn delete_rule_bindings_for_instance(
        &self,
        action_instance_id: Uuid,
    ) -> Result<u64, DbError> {
        self.inner.delete_rule_bindings_for_instance(action_instance_id).await
    }

    async fn get_rule_bindings_for_event(
        &self,
        event: &str,
        action_instance_id: Uuid,
    ) -> Result<Vec<RuleBindingRow>, DbError> {
        if self.fail_binding_lookups.load(Ordering::SeqCst) {
            return Err(DbError::Backend("connection reset".into()));
        }
        self.inner.get_rule_bindings_for_event(event, action_instance_id).await
    }

    async fn list_rule_bindings_by_event(&self, event: &str) -> Result<Vec<RuleBindingRow>, DbError> {
        self.inner.list_rule_bindings_by_event(event).await
    }

    async fn list_rule_bindings_for_instance(
        &self,
        action_instance_id: Uuid,
    ) -> Result<Vec<RuleBindingRow>, DbError> {
        self.inner.list_rule_bindings_for_instance(action_instance_id).await
    }

    async fn claim_run(&self, request: ClaimRequest) -> Result<bool, DbError> {
        self.inner.claim_run(request).await
    }

    async fn finish_claim(
        &self,
        dedup_key: &str,
        status: ClaimStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.inner.finish_claim(dedup_key, status, now).await
    }

    async fn list_retryable_claims(
        &self,
        max_attempts: i32,
    ) -> Result<Vec<ActionRunClaimRow>, DbError> {
        self.inner.list_retryable_claims(max_attempts).await
    }

    async fn get_claim(&self, dedup_key: &str) -> Result<Option<ActionRunClaimRow>, DbError> {
        self.inner.get_claim(dedup_key).await
    }

    async fn insert_action_run(&self, run: ActionRunRow) -> Result<ActionRunRow, DbError> {
        self.inner.insert_action_run(run).await
    }

    async fn list_action_runs(&self, pub_id: Uuid) -> Result<Vec<ActionRunRow>, DbError> {
        self.inner.list_action_runs(pub_id).await
    }

    async fn has_successful_run(&self, dedup_key: &str) -> Result<bool, DbError> {
        self.inner.has_successful_run(dedup_key).await
    }
}

#[tokio::test]
async fn storage_error_while_resolving_rules_leaves_the_pub_in_place() {
    let store = Arc::new(FlakyStore::new());
    let mocks = MockServices::new();
    let engine = WorkflowEngine::new(
        store.clone(),
        Arc::new(ManualClock::new(Utc::now())),
        mocks.integrations(),
        EngineConfig::default(),
    );

    let community = Uuid::new_v4();
    let a = engine.create_stage(community, "A").await.unwrap().id;
    let b = engine.create_stage(community, "B").await.unwrap().id;
    assert!(engine.add_constraint(a, b).await.unwrap());
    let instance = engine
        .create_action_instance(
            b,
            "email",
            "Notify",
            json!({ "recipient": "editor@example.org", "subject": "in B", "body": "b" }),
        )
        .await
        .unwrap();
    engine
        .create_rule_binding(instance.id, "pubEnteredStage", None)
        .await
        .unwrap();
    let pub_type = engine
        .create_pub_type(community, "Article", BTreeMap::new())
        .await
        .unwrap()
        .id;
    let p = engine.create_pub(community, pub_type, json!({})).await.unwrap().id;
    engine.move_pub(p, None, a).await.unwrap();

    store.break_binding_lookups();
    let err = engine.move_pub(p, Some(a), b).await.unwrap_err();
    assert!(matches!(err, EngineError::Database(_)));

    let stages: Vec<Uuid> =
        store.list_pub_stages(p).await.unwrap().into_iter().map(|o| o.stage_id).collect();
    assert_eq!(stages, vec![a]);
    assert_eq!(mocks.notifier.call_count(), 0);
}
