//! Stage transition integration tests.
//!
//! Drives `TransitionEngine` through its public API against an
//! `InstrumentedStore<MemoryStore>` and a `ManualClock`:
//!
//! 1. Authentication precedes any storage access
//! 2. Stage arrangement after a transition, denormalized fields included
//! 3. Freeze gated on FROZEN_TASKS_ON_STAGE_CHANGE, terminal tasks untouched
//! 4. Idempotent freeze and commit-group chunking
//! 5. Unfreeze round-trip
//! 6. Stale stage declarations and concurrent case writes
//! 7. Freeze failures after commit, then drain and retry

use std::sync::Arc;

use caseflow_engine::{
    EngineError, ErrorCode, ManualClock, MemoryAuditSink, Principal, TransitionEngine,
    TransitionRequest, UnfreezeRequest, FROZEN_REASON, FROZEN_TASKS_ON_STAGE_CHANGE,
};
use caseflow_storage::testing::InstrumentedStore;
use caseflow_storage::{
    CaseRecord, DocumentStore, FreezeState, IntentStatus, MemoryStore, Service, Stage,
    StageStatus, TaskRecord, TaskStatus,
};

type Store = InstrumentedStore<MemoryStore>;

// ──────────────────────────────────────────────
// Test fixtures
// ──────────────────────────────────────────────

struct Harness {
    store: Arc<Store>,
    clock: Arc<ManualClock>,
    audit: Arc<MemoryAuditSink>,
    engine: TransitionEngine<Store>,
}

fn harness() -> Harness {
    let store = Arc::new(InstrumentedStore::new(MemoryStore::new()));
    let clock = Arc::new(ManualClock::fixed());
    let audit = Arc::new(MemoryAuditSink::new());
    let engine = TransitionEngine::from_config(
        store.clone(),
        audit.clone(),
        clock.clone(),
        &Default::default(),
    );
    Harness {
        store,
        clock,
        audit,
        engine,
    }
}

fn clerk() -> Principal {
    Principal::new("uid-17").with_email("clerk@firm.example")
}

fn stage(id: &str, name: &str, status: StageStatus) -> Stage {
    Stage {
        id: id.to_string(),
        name: name.to_string(),
        status,
        started_at: None,
        completed_at: None,
    }
}

/// Case `case-1` with one service: intake (active), discovery (pending), trial (pending).
fn litigation_case() -> CaseRecord {
    CaseRecord {
        id: "case-1".to_string(),
        services: vec![Service {
            id: "svc-lit".to_string(),
            name: "Litigation".to_string(),
            stages: vec![
                stage("intake", "Intake", StageStatus::Active),
                stage("discovery", "Discovery", StageStatus::Pending),
                stage("trial", "Trial", StageStatus::Pending),
            ],
        }],
        current_stage: Some("intake".to_string()),
        current_stage_name: Some("Intake".to_string()),
        stage_changed_at: None,
        stage_changed_by: None,
        updated_at: None,
        version: 0,
    }
}

fn task(id: &str, stage_id: &str, status: TaskStatus) -> TaskRecord {
    TaskRecord {
        id: id.to_string(),
        case_id: "case-1".to_string(),
        stage_id: stage_id.to_string(),
        title: format!("Task {id}"),
        status,
        freeze: FreezeState::default(),
        updated_at: None,
    }
}

async fn seed(h: &Harness, tasks: Vec<TaskRecord>) {
    h.store.insert_case(litigation_case()).await.unwrap();
    for t in tasks {
        h.store.insert_task(t).await.unwrap();
    }
}

async fn enable_freeze(h: &Harness) {
    h.engine
        .flags()
        .set(FROZEN_TASKS_ON_STAGE_CHANGE, true, "admin@firm.example")
        .await
        .unwrap();
}

fn intake_to_discovery() -> TransitionRequest {
    TransitionRequest::new("case-1", "intake", "discovery", "Discovery")
}

async fn stored_task(h: &Harness, id: &str) -> TaskRecord {
    h.store.inner().get_task(id).await.unwrap()
}

// ──────────────────────────────────────────────
// 1. Authentication first
// ──────────────────────────────────────────────

#[tokio::test]
async fn unauthenticated_calls_read_nothing() {
    let h = harness();
    seed(&h, vec![task("t1", "intake", TaskStatus::Open)]).await;

    let err = h.engine.transition(intake_to_discovery(), None).await;
    assert_eq!(err, Err(EngineError::Unauthenticated));
    let err = h.engine.unfreeze(UnfreezeRequest::new("t1"), None).await;
    assert_eq!(err.unwrap_err().code(), ErrorCode::Unauthenticated);
    let err = h.engine.drain_pending(None).await;
    assert_eq!(err, Err(EngineError::Unauthenticated));

    assert_eq!(h.store.reads(), 0);
}

#[tokio::test]
async fn invalid_requests_read_nothing() {
    let h = harness();
    seed(&h, vec![]).await;

    let mut req = intake_to_discovery();
    req.new_stage_name = None;
    let err = h.engine.transition(req, Some(&clerk())).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert_eq!(h.store.reads(), 0);
}

#[tokio::test]
async fn unknown_case_is_not_found() {
    let h = harness();
    let err = h
        .engine
        .transition(
            TransitionRequest::new("case-404", "intake", "discovery", "Discovery"),
            Some(&clerk()),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

// ──────────────────────────────────────────────
// 2. Stage arrangement
// ──────────────────────────────────────────────

#[tokio::test]
async fn transition_completes_source_and_activates_target() {
    let h = harness();
    seed(&h, vec![]).await;

    let result = h
        .engine
        .transition(intake_to_discovery(), Some(&clerk()))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.from, "intake");
    assert_eq!(result.to, "discovery");
    assert_eq!(result.to_name, "Discovery");
    assert_eq!(result.timestamp, "2025-01-26T09:00:00Z");
    assert_eq!(result.intent_id, "case-1:1");

    let case = h.store.inner().get_case("case-1").await.unwrap();
    let stages = &case.services[0].stages;
    assert_eq!(stages[0].status, StageStatus::Completed);
    assert_eq!(stages[0].completed_at.as_deref(), Some("2025-01-26T09:00:00Z"));
    assert_eq!(stages[1].status, StageStatus::Active);
    assert_eq!(stages[1].started_at.as_deref(), Some("2025-01-26T09:00:00Z"));
    assert_eq!(stages[2].status, StageStatus::Pending);

    assert_eq!(case.current_stage.as_deref(), Some("discovery"));
    assert_eq!(case.current_stage_name.as_deref(), Some("Discovery"));
    assert_eq!(case.stage_changed_by.as_deref(), Some("clerk@firm.example"));
    assert_eq!(case.version, 1);

    let entries = h.audit.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "stage_transition");
    assert_eq!(entries[0].subject, "case-1");
}

#[tokio::test]
async fn service_defaults_to_the_one_declaring_the_vacated_stage() {
    let h = harness();
    let mut case = litigation_case();
    case.services.insert(
        0,
        Service {
            id: "svc-advice".to_string(),
            name: "Advice".to_string(),
            stages: vec![stage("consult", "Consult", StageStatus::Active)],
        },
    );
    h.store.insert_case(case).await.unwrap();

    h.engine
        .transition(intake_to_discovery(), Some(&clerk()))
        .await
        .unwrap();

    let case = h.store.inner().get_case("case-1").await.unwrap();
    assert_eq!(case.services[0].stages[0].status, StageStatus::Active);
    assert_eq!(case.services[1].stages[1].status, StageStatus::Active);
}

// ──────────────────────────────────────────────
// 3. Flag-gated freeze
// ──────────────────────────────────────────────

#[tokio::test]
async fn disabled_flag_freezes_nothing() {
    let h = harness();
    seed(
        &h,
        vec![
            task("t1", "intake", TaskStatus::Open),
            task("t2", "intake", TaskStatus::InProgress),
        ],
    )
    .await;

    let result = h
        .engine
        .transition(intake_to_discovery(), Some(&clerk()))
        .await
        .unwrap();
    assert_eq!(result.frozen_tasks, 0);
    assert!(!result.feature_enabled);
    assert!(!stored_task(&h, "t1").await.freeze.is_frozen);

    let intent = h.store.inner().get_freeze_intent("case-1:1").await.unwrap();
    assert_eq!(intent.status, IntentStatus::Skipped);
    assert_eq!(h.store.batch_commits(), 0);
}

#[tokio::test]
async fn enabled_flag_freezes_open_tasks_of_vacated_stage() {
    let h = harness();
    seed(
        &h,
        vec![
            task("open", "intake", TaskStatus::Open),
            task("busy", "intake", TaskStatus::InProgress),
            task("stuck", "intake", TaskStatus::Blocked),
            task("closed", "intake", TaskStatus::Closed),
            task("done", "intake", TaskStatus::Done),
            task("later", "trial", TaskStatus::Open),
        ],
    )
    .await;
    enable_freeze(&h).await;

    let result = h
        .engine
        .transition(intake_to_discovery(), Some(&clerk()))
        .await
        .unwrap();
    assert!(result.feature_enabled);
    assert_eq!(result.frozen_tasks, 3);

    for id in ["open", "busy", "stuck"] {
        let t = stored_task(&h, id).await;
        assert!(t.freeze.is_frozen, "{id} should be frozen");
        assert_eq!(t.freeze.frozen_reason.as_deref(), Some(FROZEN_REASON));
        assert_eq!(t.freeze.original_stage.as_deref(), Some("intake"));
        assert_eq!(t.freeze.moved_to_stage.as_deref(), Some("discovery"));
        assert_eq!(t.freeze.moved_to_stage_name.as_deref(), Some("Discovery"));
    }
    for id in ["closed", "done", "later"] {
        assert_eq!(stored_task(&h, id).await.freeze, FreezeState::default());
    }

    let intent = h.store.inner().get_freeze_intent("case-1:1").await.unwrap();
    assert_eq!(intent.status, IntentStatus::Completed);
    assert_eq!(intent.frozen_count, 3);
}

#[tokio::test]
async fn flag_read_failure_falls_back_to_default_and_still_transitions() {
    let h = harness();
    seed(&h, vec![task("t1", "intake", TaskStatus::Open)]).await;
    h.store.fail_flag_reads(true);

    let result = h
        .engine
        .transition(intake_to_discovery(), Some(&clerk()))
        .await
        .unwrap();
    assert!(!result.feature_enabled);
    assert_eq!(result.frozen_tasks, 0);
}

// ──────────────────────────────────────────────
// 4. Idempotence and chunking
// ──────────────────────────────────────────────

#[tokio::test]
async fn already_frozen_tasks_keep_first_freeze() {
    let h = harness();
    let mut earlier = task("t-old", "intake", TaskStatus::Open);
    earlier.freeze.is_frozen = true;
    earlier.freeze.frozen_at = Some("2025-01-20T08:00:00Z".to_string());
    seed(&h, vec![earlier, task("t-new", "intake", TaskStatus::Open)]).await;
    enable_freeze(&h).await;

    let result = h
        .engine
        .transition(intake_to_discovery(), Some(&clerk()))
        .await
        .unwrap();
    assert_eq!(result.frozen_tasks, 1);
    assert_eq!(
        stored_task(&h, "t-old").await.freeze.frozen_at.as_deref(),
        Some("2025-01-20T08:00:00Z")
    );
}

#[tokio::test]
async fn twelve_hundred_tasks_freeze_in_three_groups() {
    let h = harness();
    let tasks = (0..1200)
        .map(|i| task(&format!("t{i:04}"), "intake", TaskStatus::Open))
        .collect();
    seed(&h, tasks).await;
    enable_freeze(&h).await;

    let result = h
        .engine
        .transition(intake_to_discovery(), Some(&clerk()))
        .await
        .unwrap();
    assert_eq!(result.frozen_tasks, 1200);
    assert_eq!(h.store.batch_sizes(), vec![500, 500, 200]);
}

// ──────────────────────────────────────────────
// 5. Unfreeze
// ──────────────────────────────────────────────

#[tokio::test]
async fn unfreeze_clears_freeze_metadata() {
    let h = harness();
    seed(&h, vec![task("t1", "intake", TaskStatus::Open)]).await;
    enable_freeze(&h).await;
    h.engine
        .transition(intake_to_discovery(), Some(&clerk()))
        .await
        .unwrap();
    assert!(stored_task(&h, "t1").await.freeze.is_frozen);

    h.clock.advance(time::Duration::hours(2));
    let result = h
        .engine
        .unfreeze(UnfreezeRequest::new("t1"), Some(&clerk()))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.task_id, "t1");

    let t = stored_task(&h, "t1").await;
    assert!(!t.freeze.is_frozen);
    assert_eq!(t.freeze.frozen_reason, None);
    assert_eq!(t.freeze.frozen_at, None);
    assert_eq!(t.freeze.original_stage, None);
    assert_eq!(t.freeze.moved_to_stage, None);
    assert_eq!(t.freeze.unfrozen_by.as_deref(), Some("clerk@firm.example"));
    assert_eq!(t.freeze.unfrozen_at.as_deref(), Some("2025-01-26T11:00:00Z"));
}

#[tokio::test]
async fn unfreeze_unknown_task_is_not_found() {
    let h = harness();
    let err = h
        .engine
        .unfreeze(UnfreezeRequest::new("ghost"), Some(&clerk()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::NotFound {
            kind: "task",
            id: "ghost".to_string()
        }
    );
}

#[tokio::test]
async fn later_transition_never_unfreezes() {
    let h = harness();
    seed(&h, vec![task("t1", "intake", TaskStatus::Open)]).await;
    enable_freeze(&h).await;
    h.engine
        .transition(intake_to_discovery(), Some(&clerk()))
        .await
        .unwrap();
    h.engine
        .transition(
            TransitionRequest::new("case-1", "discovery", "trial", "Trial"),
            Some(&clerk()),
        )
        .await
        .unwrap();
    assert!(stored_task(&h, "t1").await.freeze.is_frozen);
}

// ──────────────────────────────────────────────
// 6. Stale state
// ──────────────────────────────────────────────

#[tokio::test]
async fn stale_source_stage_is_rejected_without_writing() {
    let h = harness();
    seed(&h, vec![]).await;
    h.engine
        .transition(intake_to_discovery(), Some(&clerk()))
        .await
        .unwrap();

    let err = h
        .engine
        .transition(intake_to_discovery(), Some(&clerk()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::FailedPrecondition);
    assert_eq!(h.store.inner().get_case("case-1").await.unwrap().version, 1);
}

#[tokio::test]
async fn concurrent_case_write_is_aborted() {
    let h = harness();
    seed(&h, vec![]).await;
    h.store.stale_case_reads(true);

    let err = h
        .engine
        .transition(intake_to_discovery(), Some(&clerk()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::ConcurrentModification {
            case_id: "case-1".to_string()
        }
    );
    assert_eq!(err.code(), ErrorCode::Aborted);
    assert!(err.is_retryable());

    let case = h.store.inner().get_case("case-1").await.unwrap();
    assert_eq!(case.current_stage.as_deref(), Some("intake"));
    assert!(h.store.inner().list_freeze_intents(None).await.unwrap().is_empty());
}

// ──────────────────────────────────────────────
// 7. Freeze failures after commit
// ──────────────────────────────────────────────

#[tokio::test]
async fn failed_freeze_leaves_intent_pending_until_drained() {
    let h = harness();
    seed(
        &h,
        vec![
            task("t1", "intake", TaskStatus::Open),
            task("t2", "intake", TaskStatus::Open),
        ],
    )
    .await;
    enable_freeze(&h).await;
    h.store.fail_batch_at(1);

    let err = h
        .engine
        .transition(intake_to_discovery(), Some(&clerk()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::FreezeIncomplete {
            case_id: "case-1".to_string(),
            intent_id: "case-1:1".to_string()
        }
    );
    assert_eq!(err.code(), ErrorCode::Internal);

    let case = h.store.inner().get_case("case-1").await.unwrap();
    assert_eq!(case.current_stage.as_deref(), Some("discovery"));
    let pending = h.engine.pending_intents(Some(&clerk())).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].last_error.is_some());
    assert!(!stored_task(&h, "t1").await.freeze.is_frozen);

    h.store.fail_batch_at(0);
    let report = h.engine.drain_pending(Some(&clerk())).await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(report.frozen_tasks, 2);
    assert!(report.failed.is_empty());
    assert!(stored_task(&h, "t1").await.freeze.is_frozen);

    let intent = h
        .engine
        .retry_intent("case-1:1", Some(&clerk()))
        .await
        .unwrap();
    assert_eq!(intent.status, IntentStatus::Completed);
    assert_eq!(intent.attempts, 2);
    assert_eq!(intent.frozen_count, 2);
}

#[tokio::test]
async fn skipped_intent_stays_skipped_after_flag_is_enabled() {
    let h = harness();
    seed(&h, vec![task("t1", "intake", TaskStatus::Open)]).await;
    h.store.fail_intent_updates(true);

    let result = h
        .engine
        .transition(intake_to_discovery(), Some(&clerk()))
        .await
        .unwrap();
    assert!(!result.feature_enabled);
    assert_eq!(result.frozen_tasks, 0);

    let stored = h.store.inner().get_freeze_intent("case-1:1").await.unwrap();
    assert_eq!(stored.status, IntentStatus::Pending);
    assert!(!stored.freeze_enabled);

    h.store.fail_intent_updates(false);
    enable_freeze(&h).await;
    let report = h.engine.drain_pending(Some(&clerk())).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.frozen_tasks, 0);

    assert!(!stored_task(&h, "t1").await.freeze.is_frozen);
    assert_eq!(h.store.batch_commits(), 0);
    let intent = h.store.inner().get_freeze_intent("case-1:1").await.unwrap();
    assert_eq!(intent.status, IntentStatus::Skipped);
}

#[tokio::test]
async fn retry_after_unsaved_freeze_reports_tasks_it_froze() {
    let h = harness();
    seed(
        &h,
        vec![
            task("t1", "intake", TaskStatus::Open),
            task("t2", "intake", TaskStatus::Open),
        ],
    )
    .await;
    enable_freeze(&h).await;
    h.store.fail_intent_updates(true);

    let err = h
        .engine
        .transition(intake_to_discovery(), Some(&clerk()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::FreezeIncomplete { .. }));
    for id in ["t1", "t2"] {
        let t = stored_task(&h, id).await;
        assert!(t.freeze.is_frozen);
        assert_eq!(t.freeze.freeze_intent_id.as_deref(), Some("case-1:1"));
    }
    let stored = h.store.inner().get_freeze_intent("case-1:1").await.unwrap();
    assert_eq!(stored.frozen_count, 0);

    h.store.fail_intent_updates(false);
    let intent = h
        .engine
        .retry_intent("case-1:1", Some(&clerk()))
        .await
        .unwrap();
    assert_eq!(intent.status, IntentStatus::Completed);
    assert_eq!(intent.frozen_count, 2);
    assert_eq!(h.store.batch_commits(), 1);

    let saved = h.store.inner().get_freeze_intent("case-1:1").await.unwrap();
    assert_eq!(saved.frozen_count, 2);
}

#[tokio::test]
async fn retry_of_unknown_intent_is_not_found() {
    let h = harness();
    let err = h
        .engine
        .retry_intent("case-1:9", Some(&clerk()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}
