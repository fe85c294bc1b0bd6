use std::future::Future;

use super::{make_flag_document, TestResult};
use crate::record::FlagChange;
use crate::{DocumentStore, StorageError};

pub(super) async fn run_flag_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "flags",
            "absent_document_reads_none",
            absent_document_reads_none(factory).await,
        ),
        TestResult::from_result(
            "flags",
            "create_twice_rejected",
            create_twice_rejected(factory).await,
        ),
        TestResult::from_result(
            "flags",
            "update_without_document_not_found",
            update_without_document_not_found(factory).await,
        ),
        TestResult::from_result(
            "flags",
            "updates_append_history",
            updates_append_history(factory).await,
        ),
    ]
}

fn change(value: bool, by: &str, at: &str) -> FlagChange {
    FlagChange {
        value,
        changed_by: by.to_string(),
        changed_at: at.to_string(),
    }
}

async fn absent_document_reads_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_flag_document().await {
        Ok(None) => Ok(()),
        other => Err(format!("expected Ok(None), got {other:?}")),
    }
}

async fn create_twice_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.create_flag_document(make_flag_document())
        .await
        .map_err(|e| e.to_string())?;
    match s.create_flag_document(make_flag_document()).await {
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        other => Err(format!("expected AlreadyExists, got {other:?}")),
    }
}

async fn update_without_document_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s
        .update_flag("FLAG_A", change(true, "admin", "2025-01-02T00:00:00Z"))
        .await
    {
        Err(StorageError::NotFound { .. }) => Ok(()),
        other => Err(format!("expected NotFound, got {other:?}")),
    }
}

async fn updates_append_history<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.create_flag_document(make_flag_document())
        .await
        .map_err(|e| e.to_string())?;
    s.update_flag("FLAG_A", change(true, "alice", "2025-01-02T00:00:00Z"))
        .await
        .map_err(|e| e.to_string())?;
    s.update_flag("FLAG_A", change(false, "bob", "2025-01-03T00:00:00Z"))
        .await
        .map_err(|e| e.to_string())?;

    let doc = s
        .get_flag_document()
        .await
        .map_err(|e| e.to_string())?
        .ok_or("flag document vanished")?;
    if doc.flags.get("FLAG_A") != Some(&false) {
        return Err(format!("expected FLAG_A=false, got {:?}", doc.flags));
    }
    let history = doc.history.get("FLAG_A").cloned().unwrap_or_default();
    let authors: Vec<&str> = history.iter().map(|c| c.changed_by.as_str()).collect();
    if authors != ["alice", "bob"] {
        return Err(format!("expected history [alice, bob], got {authors:?}"));
    }
    if doc.last_changed_by.as_deref() != Some("bob") || doc.updated_at != "2025-01-03T00:00:00Z"
    {
        return Err(format!(
            "document metadata not bumped: {:?} at {}",
            doc.last_changed_by, doc.updated_at
        ));
    }
    Ok(())
}
