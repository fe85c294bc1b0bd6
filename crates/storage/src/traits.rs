use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{
    CaseCommit, CaseRecord, FlagChange, FlagDocument, FreezeIntent, IntentStatus, TaskBatch,
    TaskMutation, TaskQuery, TaskRecord,
};

/// The document-store client used by the stage transition engine.
///
/// A `DocumentStore` holds four kinds of documents: cases, tasks, the single
/// feature-flag document, and freeze intents.
///
/// ## Atomic units
///
/// Each method is one atomic unit. In particular:
///
/// - `commit_case_transition` writes the case AND inserts the optional
///   freeze intent together, conditional on the stored case version.
/// - `commit_batch` applies every write in the batch or none of them. A
///   write whose target already holds the state it produces is skipped
///   inside the same unit, so stale candidate lists never re-apply it.
///   Separate batches are independent; there is no cross-batch atomicity.
///
/// ## OCC Conflict Detection
///
/// `commit_case_transition` performs a compare-and-swap on `version`.
/// If the stored version differs from `expected_version`, it returns
/// `Err(StorageError::ConcurrentConflict { .. })` and writes nothing.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    // ── Cases ────────────────────────────────────────────────────────────────

    /// Insert a new case. Returns `AlreadyExists` if the id is taken.
    async fn insert_case(&self, case: CaseRecord) -> Result<(), StorageError>;

    /// Read a case by id. Returns `NotFound` if absent.
    async fn get_case(&self, case_id: &str) -> Result<CaseRecord, StorageError>;

    /// Version-checked case write, coupled with an optional intent insert.
    ///
    /// Returns the new version (`expected_version + 1`) on success.
    async fn commit_case_transition(&self, commit: CaseCommit) -> Result<i64, StorageError>;

    // ── Tasks ────────────────────────────────────────────────────────────────

    /// Insert a new task. Returns `AlreadyExists` if the id is taken.
    async fn insert_task(&self, task: TaskRecord) -> Result<(), StorageError>;

    /// Read a task by id. Returns `NotFound` if absent.
    async fn get_task(&self, task_id: &str) -> Result<TaskRecord, StorageError>;

    /// List tasks matching the query, in insertion order.
    async fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskRecord>, StorageError>;

    /// Apply a single-document update and return the updated task.
    async fn update_task(
        &self,
        task_id: &str,
        mutation: &TaskMutation,
    ) -> Result<TaskRecord, StorageError>;

    /// Commit a batch of task writes atomically and return how many writes
    /// changed a task. Writes already satisfied by the stored task
    /// ([`TaskMutation::is_satisfied_by`]) are skipped.
    ///
    /// Returns `BatchTooLarge` if the batch exceeds
    /// [`MAX_BATCH_OPERATIONS`](crate::MAX_BATCH_OPERATIONS), and `NotFound`
    /// (writing nothing) if any target task is absent.
    async fn commit_batch(&self, batch: TaskBatch) -> Result<usize, StorageError>;

    // ── Feature flags ────────────────────────────────────────────────────────

    /// Read the flag document. `Ok(None)` if it has never been created.
    async fn get_flag_document(&self) -> Result<Option<FlagDocument>, StorageError>;

    /// Create the flag document. Returns `AlreadyExists` if present.
    async fn create_flag_document(&self, document: FlagDocument) -> Result<(), StorageError>;

    /// Set one flag value and append the change to its history.
    ///
    /// Returns `NotFound` if the flag document does not exist.
    async fn update_flag(&self, name: &str, change: FlagChange) -> Result<(), StorageError>;

    // ── Freeze intents ───────────────────────────────────────────────────────

    /// Read a freeze intent by id. Returns `NotFound` if absent.
    async fn get_freeze_intent(&self, intent_id: &str) -> Result<FreezeIntent, StorageError>;

    /// List intents, optionally filtered by status, oldest first.
    async fn list_freeze_intents(
        &self,
        status: Option<IntentStatus>,
    ) -> Result<Vec<FreezeIntent>, StorageError>;

    /// Replace an existing intent. Returns `NotFound` if absent.
    async fn update_freeze_intent(&self, intent: FreezeIntent) -> Result<(), StorageError>;
}
