//! Test double wrapping any `DocumentStore`.
//!
//! [`InstrumentedStore`] forwards every call to an inner store while counting
//! reads, recording batch sizes, and injecting failures, delays, or stale
//! reads on demand. Engine tests use it to assert ordering (no read before
//! authentication) and to exercise the partial-failure seams of batch
//! commits and flag reads.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{
    CaseCommit, CaseRecord, FlagChange, FlagDocument, FreezeIntent, IntentStatus, TaskBatch,
    TaskMutation, TaskQuery, TaskRecord,
};
use crate::traits::DocumentStore;

/// A `DocumentStore` wrapper with read counters and failure injection.
pub struct InstrumentedStore<S> {
    inner: S,
    reads: AtomicUsize,
    flag_reads: AtomicUsize,
    batch_commits: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    fail_flag_reads: AtomicBool,
    flag_read_delay_ms: AtomicU64,
    fail_case_commits: AtomicBool,
    fail_intent_updates: AtomicBool,
    stale_case_reads: AtomicBool,
    /// 1-based index of the batch commit that should fail; 0 = never.
    fail_batch_at: AtomicUsize,
}

impl<S: DocumentStore> InstrumentedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            flag_reads: AtomicUsize::new(0),
            batch_commits: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
            fail_flag_reads: AtomicBool::new(false),
            flag_read_delay_ms: AtomicU64::new(0),
            fail_case_commits: AtomicBool::new(false),
            fail_intent_updates: AtomicBool::new(false),
            stale_case_reads: AtomicBool::new(false),
            fail_batch_at: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total document reads of any kind (cases, tasks, flags, intents).
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Reads of the flag document only.
    pub fn flag_reads(&self) -> usize {
        self.flag_reads.load(Ordering::SeqCst)
    }

    /// Number of `commit_batch` calls issued, failed ones included.
    pub fn batch_commits(&self) -> usize {
        self.batch_commits.load(Ordering::SeqCst)
    }

    /// Sizes of every batch submitted, in submission order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes
            .lock()
            .map(|sizes| sizes.clone())
            .unwrap_or_default()
    }

    pub fn fail_flag_reads(&self, fail: bool) {
        self.fail_flag_reads.store(fail, Ordering::SeqCst);
    }

    /// Hold every flag document read for `delay` after the inner store has
    /// answered, so the caller sees a value that may since have changed.
    pub fn delay_flag_reads(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.flag_read_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn fail_case_commits(&self, fail: bool) {
        self.fail_case_commits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_intent_updates(&self, fail: bool) {
        self.fail_intent_updates.store(fail, Ordering::SeqCst);
    }

    /// Serve cases one version behind what is stored, as if another writer
    /// committed between the caller's read and its write.
    pub fn stale_case_reads(&self, stale: bool) {
        self.stale_case_reads.store(stale, Ordering::SeqCst);
    }

    /// Make the `n`th batch commit (1-based, counted from now on) fail.
    /// Pass 0 to disable.
    pub fn fail_batch_at(&self, n: usize) {
        let base = if n == 0 { 0 } else { self.batch_commits() + n };
        self.fail_batch_at.store(base, Ordering::SeqCst);
    }

    fn count_read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn injected(what: &str) -> StorageError {
        StorageError::Backend(format!("injected failure: {what}"))
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for InstrumentedStore<S> {
    async fn insert_case(&self, case: CaseRecord) -> Result<(), StorageError> {
        self.inner.insert_case(case).await
    }

    async fn get_case(&self, case_id: &str) -> Result<CaseRecord, StorageError> {
        self.count_read();
        let mut case = self.inner.get_case(case_id).await?;
        if self.stale_case_reads.load(Ordering::SeqCst) {
            case.version -= 1;
        }
        Ok(case)
    }

    async fn commit_case_transition(&self, commit: CaseCommit) -> Result<i64, StorageError> {
        if self.fail_case_commits.load(Ordering::SeqCst) {
            return Err(Self::injected("case commit"));
        }
        self.inner.commit_case_transition(commit).await
    }

    async fn insert_task(&self, task: TaskRecord) -> Result<(), StorageError> {
        self.inner.insert_task(task).await
    }

    async fn get_task(&self, task_id: &str) -> Result<TaskRecord, StorageError> {
        self.count_read();
        self.inner.get_task(task_id).await
    }

    async fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskRecord>, StorageError> {
        self.count_read();
        self.inner.query_tasks(query).await
    }

    async fn update_task(
        &self,
        task_id: &str,
        mutation: &TaskMutation,
    ) -> Result<TaskRecord, StorageError> {
        self.inner.update_task(task_id, mutation).await
    }

    async fn commit_batch(&self, batch: TaskBatch) -> Result<usize, StorageError> {
        let n = self.batch_commits.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut sizes) = self.batch_sizes.lock() {
            sizes.push(batch.len());
        }
        if self.fail_batch_at.load(Ordering::SeqCst) == n {
            return Err(Self::injected("batch commit"));
        }
        self.inner.commit_batch(batch).await
    }

    async fn get_flag_document(&self) -> Result<Option<FlagDocument>, StorageError> {
        self.count_read();
        self.flag_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_flag_reads.load(Ordering::SeqCst) {
            return Err(Self::injected("flag read"));
        }
        let document = self.inner.get_flag_document().await;
        let delay = self.flag_read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        document
    }

    async fn create_flag_document(&self, document: FlagDocument) -> Result<(), StorageError> {
        self.inner.create_flag_document(document).await
    }

    async fn update_flag(&self, name: &str, change: FlagChange) -> Result<(), StorageError> {
        self.inner.update_flag(name, change).await
    }

    async fn get_freeze_intent(&self, intent_id: &str) -> Result<FreezeIntent, StorageError> {
        self.count_read();
        self.inner.get_freeze_intent(intent_id).await
    }

    async fn list_freeze_intents(
        &self,
        status: Option<IntentStatus>,
    ) -> Result<Vec<FreezeIntent>, StorageError> {
        self.count_read();
        self.inner.list_freeze_intents(status).await
    }

    async fn update_freeze_intent(&self, intent: FreezeIntent) -> Result<(), StorageError> {
        if self.fail_intent_updates.load(Ordering::SeqCst) {
            return Err(Self::injected("intent update"));
        }
        self.inner.update_freeze_intent(intent).await
    }
}
