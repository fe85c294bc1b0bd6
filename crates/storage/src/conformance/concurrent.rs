use std::future::Future;
use std::sync::Arc;

use super::{make_case, TestResult};
use crate::record::CaseCommit;
use crate::{DocumentStore, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_commits_exactly_one_wins",
            concurrent_commits_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_commits_different_cases_all_succeed",
            concurrent_commits_different_cases_all_succeed(factory).await,
        ),
    ]
}

// ── Concurrent commit: exactly one wins ──────────────────────────────────────

/// N tasks each attempt to commit the same case from version 0. Exactly one
/// commit succeeds; the rest must get ConcurrentConflict, and the stored case
/// reflects the winner.
async fn concurrent_commits_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    storage
        .insert_case(make_case("case-1"))
        .await
        .map_err(|e| format!("insert: {e}"))?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut case = make_case("case-1");
            case.stage_changed_by = Some(format!("writer-{i}"));
            match s
                .commit_case_transition(CaseCommit {
                    case,
                    expected_version: 0,
                    intent: None,
                })
                .await
            {
                Ok(_) => Ok(Some(i)),
                Err(StorageError::ConcurrentConflict { .. }) => Ok(None),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if let Some(i) = won {
            winners.push(i);
        }
    }
    if winners.len() != 1 {
        return Err(format!("expected exactly 1 winner, got {}", winners.len()));
    }

    let stored = storage
        .get_case("case-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    let expected_writer = format!("writer-{}", winners[0]);
    if stored.version != 1 || stored.stage_changed_by.as_deref() != Some(&expected_writer) {
        return Err(format!(
            "expected version 1 written by {expected_writer}, got version {} by {:?}",
            stored.version, stored.stage_changed_by
        ));
    }
    Ok(())
}

// ── Concurrent commits to different cases: all succeed ───────────────────────

/// No false conflicts when there is no contention.
async fn concurrent_commits_different_cases_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    for i in 0..N {
        storage
            .insert_case(make_case(&format!("case-{i}")))
            .await
            .map_err(|e| format!("insert case-{i}: {e}"))?;
    }

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            s.commit_case_transition(CaseCommit {
                case: make_case(&format!("case-{i}")),
                expected_version: 0,
                intent: None,
            })
            .await
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        handle
            .await
            .map_err(|e| format!("task {i} panic: {e}"))?
            .map_err(|e| format!("task {i} failed: {e}"))?;
    }
    Ok(())
}
