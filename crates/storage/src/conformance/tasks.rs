use std::future::Future;

use super::{make_freeze, make_task, TestResult};
use crate::record::{TaskBatch, TaskMutation, TaskQuery, TaskStatus, MAX_BATCH_OPERATIONS};
use crate::{DocumentStore, StorageError};

pub(super) async fn run_task_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "tasks",
            "query_filters_case_stage_and_status",
            query_filters_case_stage_and_status(factory).await,
        ),
        TestResult::from_result(
            "tasks",
            "query_preserves_insertion_order",
            query_preserves_insertion_order(factory).await,
        ),
        TestResult::from_result(
            "tasks",
            "update_task_returns_updated_record",
            update_task_returns_updated_record(factory).await,
        ),
        TestResult::from_result(
            "tasks",
            "update_missing_task_not_found",
            update_missing_task_not_found(factory).await,
        ),
        TestResult::from_result(
            "tasks",
            "batch_applies_every_write",
            batch_applies_every_write(factory).await,
        ),
        TestResult::from_result(
            "tasks",
            "batch_skips_satisfied_writes",
            batch_skips_satisfied_writes(factory).await,
        ),
        TestResult::from_result(
            "tasks",
            "batch_at_limit_accepted",
            batch_at_limit_accepted(factory).await,
        ),
        TestResult::from_result(
            "tasks",
            "batch_over_limit_rejected",
            batch_over_limit_rejected(factory).await,
        ),
        TestResult::from_result(
            "tasks",
            "batch_with_missing_target_is_all_or_nothing",
            batch_with_missing_target_is_all_or_nothing(factory).await,
        ),
    ]
}

async fn query_filters_case_stage_and_status<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let tasks = [
        make_task("t-1", "case-1", "stage-a", TaskStatus::Open),
        make_task("t-2", "case-1", "stage-a", TaskStatus::Done),
        make_task("t-3", "case-1", "stage-b", TaskStatus::Open),
        make_task("t-4", "case-2", "stage-a", TaskStatus::Open),
        make_task("t-5", "case-1", "stage-a", TaskStatus::Closed),
        make_task("t-6", "case-1", "stage-a", TaskStatus::InProgress),
    ];
    for t in tasks {
        s.insert_task(t).await.map_err(|e| e.to_string())?;
    }

    let found = s
        .query_tasks(&TaskQuery {
            case_id: Some("case-1".to_string()),
            stage_id: Some("stage-a".to_string()),
            exclude_statuses: TaskStatus::TERMINAL.to_vec(),
            frozen: None,
        })
        .await
        .map_err(|e| e.to_string())?;
    let ids: Vec<&str> = found.iter().map(|t| t.id.as_str()).collect();
    if ids != ["t-1", "t-6"] {
        return Err(format!("expected [t-1, t-6], got {ids:?}"));
    }
    Ok(())
}

async fn query_preserves_insertion_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for i in (0..20).rev() {
        s.insert_task(make_task(
            &format!("t-{i:02}"),
            "case-1",
            "stage-a",
            TaskStatus::Open,
        ))
        .await
        .map_err(|e| e.to_string())?;
    }
    let found = s
        .query_tasks(&TaskQuery::default())
        .await
        .map_err(|e| e.to_string())?;
    let first = found.first().map(|t| t.id.as_str());
    let last = found.last().map(|t| t.id.as_str());
    if found.len() != 20 || first != Some("t-19") || last != Some("t-00") {
        return Err(format!(
            "expected 20 tasks from t-19 to t-00, got {} ({first:?}..{last:?})",
            found.len()
        ));
    }
    Ok(())
}

async fn update_task_returns_updated_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_task(make_task("t-1", "case-1", "stage-a", TaskStatus::Open))
        .await
        .map_err(|e| e.to_string())?;
    let updated = s
        .update_task("t-1", &make_freeze())
        .await
        .map_err(|e| e.to_string())?;
    if !updated.freeze.is_frozen {
        return Err("returned record is not frozen".to_string());
    }
    let stored = s.get_task("t-1").await.map_err(|e| e.to_string())?;
    if stored != updated {
        return Err(format!("stored {stored:?} differs from returned {updated:?}"));
    }
    Ok(())
}

async fn update_missing_task_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let unfreeze = TaskMutation::Unfreeze {
        actor: "tester".to_string(),
        at: "2025-01-01T00:00:00Z".to_string(),
    };
    match s.update_task("t-missing", &unfreeze).await {
        Err(StorageError::NotFound { .. }) => Ok(()),
        other => Err(format!("expected NotFound, got {other:?}")),
    }
}

async fn batch_applies_every_write<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut batch = TaskBatch::new();
    for i in 0..10 {
        let id = format!("t-{i}");
        s.insert_task(make_task(&id, "case-1", "stage-a", TaskStatus::Open))
            .await
            .map_err(|e| e.to_string())?;
        batch.update(id, make_freeze());
    }
    let applied = s.commit_batch(batch).await.map_err(|e| e.to_string())?;
    if applied != 10 {
        return Err(format!("expected 10 applied writes, got {applied}"));
    }

    let frozen = s
        .query_tasks(&TaskQuery {
            frozen: Some(true),
            ..TaskQuery::default()
        })
        .await
        .map_err(|e| e.to_string())?;
    if frozen.len() != 10 {
        return Err(format!("expected 10 frozen tasks, got {}", frozen.len()));
    }
    Ok(())
}

async fn batch_skips_satisfied_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for id in ["t-1", "t-2", "t-3"] {
        s.insert_task(make_task(id, "case-1", "stage-a", TaskStatus::Open))
            .await
            .map_err(|e| e.to_string())?;
    }
    let mut first = TaskBatch::new();
    first.update("t-1", make_freeze());
    s.commit_batch(first).await.map_err(|e| e.to_string())?;

    let mut second = TaskBatch::new();
    for id in ["t-1", "t-2", "t-3"] {
        second.update(id, make_freeze());
    }
    let applied = s.commit_batch(second).await.map_err(|e| e.to_string())?;
    if applied != 2 {
        return Err(format!("expected 2 applied writes, got {applied}"));
    }
    Ok(())
}

async fn batch_at_limit_accepted<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut batch = TaskBatch::with_capacity(MAX_BATCH_OPERATIONS);
    for i in 0..MAX_BATCH_OPERATIONS {
        let id = format!("t-{i}");
        s.insert_task(make_task(&id, "case-1", "stage-a", TaskStatus::Open))
            .await
            .map_err(|e| e.to_string())?;
        batch.update(id, make_freeze());
    }
    s.commit_batch(batch)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string())
}

async fn batch_over_limit_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut batch = TaskBatch::new();
    for i in 0..=MAX_BATCH_OPERATIONS {
        let id = format!("t-{i}");
        s.insert_task(make_task(&id, "case-1", "stage-a", TaskStatus::Open))
            .await
            .map_err(|e| e.to_string())?;
        batch.update(id, make_freeze());
    }
    match s.commit_batch(batch).await {
        Err(StorageError::BatchTooLarge { .. }) => {}
        other => return Err(format!("expected BatchTooLarge, got {other:?}")),
    }
    let frozen = s
        .query_tasks(&TaskQuery {
            frozen: Some(true),
            ..TaskQuery::default()
        })
        .await
        .map_err(|e| e.to_string())?;
    if !frozen.is_empty() {
        return Err(format!("rejected batch froze {} tasks", frozen.len()));
    }
    Ok(())
}

async fn batch_with_missing_target_is_all_or_nothing<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_task(make_task("t-1", "case-1", "stage-a", TaskStatus::Open))
        .await
        .map_err(|e| e.to_string())?;
    let mut batch = TaskBatch::new();
    batch.update("t-1", make_freeze());
    batch.update("t-ghost", make_freeze());
    if s.commit_batch(batch).await.is_ok() {
        return Err("batch with a missing target committed".to_string());
    }
    let t1 = s.get_task("t-1").await.map_err(|e| e.to_string())?;
    if t1.freeze.is_frozen {
        return Err("failed batch partially applied".to_string());
    }
    Ok(())
}
