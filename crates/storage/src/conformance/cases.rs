use std::future::Future;

use super::{make_case, make_intent, TestResult};
use crate::record::{CaseCommit, IntentStatus, StageStatus};
use crate::{DocumentStore, StorageError};

pub(super) async fn run_case_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "cases",
            "inserted_case_is_readable",
            inserted_case_is_readable(factory).await,
        ),
        TestResult::from_result(
            "cases",
            "duplicate_insert_rejected",
            duplicate_insert_rejected(factory).await,
        ),
        TestResult::from_result(
            "cases",
            "missing_case_not_found",
            missing_case_not_found(factory).await,
        ),
        TestResult::from_result(
            "cases",
            "commit_increments_version",
            commit_increments_version(factory).await,
        ),
        TestResult::from_result(
            "cases",
            "stale_version_conflicts_without_writing",
            stale_version_conflicts_without_writing(factory).await,
        ),
        TestResult::from_result(
            "cases",
            "commit_inserts_intent_atomically",
            commit_inserts_intent_atomically(factory).await,
        ),
        TestResult::from_result(
            "cases",
            "conflict_does_not_insert_intent",
            conflict_does_not_insert_intent(factory).await,
        ),
    ]
}

async fn inserted_case_is_readable<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_case(make_case("case-1"))
        .await
        .map_err(|e| e.to_string())?;
    let case = s.get_case("case-1").await.map_err(|e| e.to_string())?;
    if case != make_case("case-1") {
        return Err(format!("read back a different case: {case:?}"));
    }
    Ok(())
}

async fn duplicate_insert_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_case(make_case("case-1"))
        .await
        .map_err(|e| e.to_string())?;
    match s.insert_case(make_case("case-1")).await {
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        other => Err(format!("expected AlreadyExists, got {other:?}")),
    }
}

async fn missing_case_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_case("nope").await {
        Err(StorageError::NotFound { .. }) => Ok(()),
        other => Err(format!("expected NotFound, got {other:?}")),
    }
}

async fn commit_increments_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_case(make_case("case-1"))
        .await
        .map_err(|e| e.to_string())?;

    let mut case = make_case("case-1");
    case.services[0].stages[0].status = StageStatus::Completed;
    let v1 = s
        .commit_case_transition(CaseCommit {
            case: case.clone(),
            expected_version: 0,
            intent: None,
        })
        .await
        .map_err(|e| e.to_string())?;
    let v2 = s
        .commit_case_transition(CaseCommit {
            case,
            expected_version: 1,
            intent: None,
        })
        .await
        .map_err(|e| e.to_string())?;
    if (v1, v2) != (1, 2) {
        return Err(format!("expected versions (1, 2), got ({v1}, {v2})"));
    }

    let stored = s.get_case("case-1").await.map_err(|e| e.to_string())?;
    if stored.version != 2 || stored.services[0].stages[0].status != StageStatus::Completed {
        return Err(format!("unexpected stored case: {stored:?}"));
    }
    Ok(())
}

async fn stale_version_conflicts_without_writing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_case(make_case("case-1"))
        .await
        .map_err(|e| e.to_string())?;

    let mut case = make_case("case-1");
    case.current_stage = Some("stage-b".to_string());
    match s
        .commit_case_transition(CaseCommit {
            case,
            expected_version: 7,
            intent: None,
        })
        .await
    {
        Err(StorageError::ConcurrentConflict {
            expected_version: 7,
            actual_version: 0,
            ..
        }) => {}
        other => return Err(format!("expected ConcurrentConflict, got {other:?}")),
    }

    let stored = s.get_case("case-1").await.map_err(|e| e.to_string())?;
    if stored.current_stage.as_deref() != Some("stage-a") || stored.version != 0 {
        return Err(format!("conflicting commit mutated the case: {stored:?}"));
    }
    Ok(())
}

async fn commit_inserts_intent_atomically<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_case(make_case("case-1"))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_case_transition(CaseCommit {
        case: make_case("case-1"),
        expected_version: 0,
        intent: Some(make_intent("case-1:1", "case-1")),
    })
    .await
    .map_err(|e| e.to_string())?;

    let pending = s
        .list_freeze_intents(Some(IntentStatus::Pending))
        .await
        .map_err(|e| e.to_string())?;
    if pending.len() != 1 || pending[0].id != "case-1:1" {
        return Err(format!("expected one pending intent, got {pending:?}"));
    }

    let mut intent = pending[0].clone();
    intent.status = IntentStatus::Completed;
    intent.frozen_count = 3;
    s.update_freeze_intent(intent)
        .await
        .map_err(|e| e.to_string())?;
    let stored = s
        .get_freeze_intent("case-1:1")
        .await
        .map_err(|e| e.to_string())?;
    if stored.status != IntentStatus::Completed || stored.frozen_count != 3 {
        return Err(format!("intent update not persisted: {stored:?}"));
    }
    let still_pending = s
        .list_freeze_intents(Some(IntentStatus::Pending))
        .await
        .map_err(|e| e.to_string())?;
    if !still_pending.is_empty() {
        return Err("completed intent still listed as pending".to_string());
    }
    Ok(())
}

async fn conflict_does_not_insert_intent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_case(make_case("case-1"))
        .await
        .map_err(|e| e.to_string())?;
    let result = s
        .commit_case_transition(CaseCommit {
            case: make_case("case-1"),
            expected_version: 3,
            intent: Some(make_intent("case-1:4", "case-1")),
        })
        .await;
    if result.is_ok() {
        return Err("stale commit succeeded".to_string());
    }
    match s.get_freeze_intent("case-1:4").await {
        Err(StorageError::NotFound { .. }) => Ok(()),
        other => Err(format!("intent leaked from a failed commit: {other:?}")),
    }
}
