//! In-memory `DocumentStore` backend.
//!
//! Backs the development server and the test suites. All state lives behind a
//! single `tokio::sync::RwLock`, so each trait method is trivially atomic.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::{
    CaseCommit, CaseRecord, FlagChange, FlagDocument, FreezeIntent, IntentStatus, TaskBatch,
    TaskMutation, TaskQuery, TaskRecord, CASES, FLAGS, FREEZE_INTENTS, MAX_BATCH_OPERATIONS, TASKS,
};
use crate::traits::DocumentStore;

/// Initial documents loaded into a `MemoryStore`, usually from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub cases: Vec<CaseRecord>,
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
    #[serde(default)]
    pub flags: Option<FlagDocument>,
}

impl SeedData {
    /// Read and parse a JSON seed file.
    pub fn from_path(path: &Path) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Backend(format!("could not read '{}': {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            StorageError::Backend(format!("could not parse '{}': {}", path.display(), e))
        })
    }
}

#[derive(Default)]
struct Inner {
    cases: HashMap<String, CaseRecord>,
    tasks: Vec<TaskRecord>,
    task_index: HashMap<String, usize>,
    flags: Option<FlagDocument>,
    intents: Vec<FreezeIntent>,
    intent_index: HashMap<String, usize>,
}

impl Inner {
    fn task_mut(&mut self, task_id: &str) -> Result<&mut TaskRecord, StorageError> {
        let idx = *self
            .task_index
            .get(task_id)
            .ok_or_else(|| StorageError::not_found(TASKS, task_id))?;
        Ok(&mut self.tasks[idx])
    }

    fn insert_task(&mut self, task: TaskRecord) -> Result<(), StorageError> {
        if self.task_index.contains_key(&task.id) {
            return Err(StorageError::already_exists(TASKS, &task.id));
        }
        self.task_index.insert(task.id.clone(), self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    fn insert_intent(&mut self, intent: FreezeIntent) -> Result<(), StorageError> {
        if self.intent_index.contains_key(&intent.id) {
            return Err(StorageError::already_exists(FREEZE_INTENTS, &intent.id));
        }
        self.intent_index
            .insert(intent.id.clone(), self.intents.len());
        self.intents.push(intent);
        Ok(())
    }
}

/// A `DocumentStore` that keeps every document in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with seed documents.
    pub fn from_seed(seed: SeedData) -> Result<Self, StorageError> {
        let mut inner = Inner {
            flags: seed.flags,
            ..Inner::default()
        };
        for case in seed.cases {
            if inner.cases.contains_key(&case.id) {
                return Err(StorageError::already_exists(CASES, &case.id));
            }
            inner.cases.insert(case.id.clone(), case);
        }
        for task in seed.tasks {
            inner.insert_task(task)?;
        }
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Number of tasks currently stored.
    pub async fn task_count(&self) -> usize {
        self.inner.read().await.tasks.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_case(&self, case: CaseRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        if inner.cases.contains_key(&case.id) {
            return Err(StorageError::already_exists(CASES, &case.id));
        }
        inner.cases.insert(case.id.clone(), case);
        Ok(())
    }

    async fn get_case(&self, case_id: &str) -> Result<CaseRecord, StorageError> {
        let inner = self.inner.read().await;
        inner
            .cases
            .get(case_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(CASES, case_id))
    }

    async fn commit_case_transition(&self, commit: CaseCommit) -> Result<i64, StorageError> {
        let mut inner = self.inner.write().await;
        let CaseCommit {
            mut case,
            expected_version,
            intent,
        } = commit;

        let stored = inner
            .cases
            .get(&case.id)
            .ok_or_else(|| StorageError::not_found(CASES, &case.id))?;
        if stored.version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                case_id: case.id.clone(),
                expected_version,
                actual_version: stored.version,
            });
        }
        if let Some(intent) = &intent {
            if inner.intent_index.contains_key(&intent.id) {
                return Err(StorageError::already_exists(FREEZE_INTENTS, &intent.id));
            }
        }

        let new_version = expected_version + 1;
        case.version = new_version;
        inner.cases.insert(case.id.clone(), case);
        if let Some(intent) = intent {
            inner.insert_intent(intent)?;
        }
        Ok(new_version)
    }

    async fn insert_task(&self, task: TaskRecord) -> Result<(), StorageError> {
        self.inner.write().await.insert_task(task)
    }

    async fn get_task(&self, task_id: &str) -> Result<TaskRecord, StorageError> {
        let inner = self.inner.read().await;
        inner
            .task_index
            .get(task_id)
            .map(|&idx| inner.tasks[idx].clone())
            .ok_or_else(|| StorageError::not_found(TASKS, task_id))
    }

    async fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskRecord>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .tasks
            .iter()
            .filter(|t| query.matches(t))
            .cloned()
            .collect())
    }

    async fn update_task(
        &self,
        task_id: &str,
        mutation: &TaskMutation,
    ) -> Result<TaskRecord, StorageError> {
        let mut inner = self.inner.write().await;
        let task = inner.task_mut(task_id)?;
        mutation.apply_to(task);
        Ok(task.clone())
    }

    async fn commit_batch(&self, batch: TaskBatch) -> Result<usize, StorageError> {
        if batch.len() > MAX_BATCH_OPERATIONS {
            return Err(StorageError::BatchTooLarge {
                operations: batch.len(),
                limit: MAX_BATCH_OPERATIONS,
            });
        }

        let mut inner = self.inner.write().await;
        // Validate every target before touching anything.
        if let Some(missing) = batch
            .writes()
            .iter()
            .find(|w| !inner.task_index.contains_key(&w.task_id))
        {
            return Err(StorageError::not_found(TASKS, &missing.task_id));
        }
        let mut applied = 0;
        for write in batch.into_writes() {
            let task = inner.task_mut(&write.task_id)?;
            if write.mutation.is_satisfied_by(task) {
                continue;
            }
            write.mutation.apply_to(task);
            applied += 1;
        }
        Ok(applied)
    }

    async fn get_flag_document(&self) -> Result<Option<FlagDocument>, StorageError> {
        Ok(self.inner.read().await.flags.clone())
    }

    async fn create_flag_document(&self, document: FlagDocument) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        if inner.flags.is_some() {
            return Err(StorageError::already_exists(FLAGS, "feature_flags"));
        }
        inner.flags = Some(document);
        Ok(())
    }

    async fn update_flag(&self, name: &str, change: FlagChange) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let doc = inner
            .flags
            .as_mut()
            .ok_or_else(|| StorageError::not_found(FLAGS, "feature_flags"))?;
        doc.flags.insert(name.to_string(), change.value);
        doc.updated_at = change.changed_at.clone();
        doc.last_changed_by = Some(change.changed_by.clone());
        doc.history.entry(name.to_string()).or_default().push(change);
        Ok(())
    }

    async fn get_freeze_intent(&self, intent_id: &str) -> Result<FreezeIntent, StorageError> {
        let inner = self.inner.read().await;
        inner
            .intent_index
            .get(intent_id)
            .map(|&idx| inner.intents[idx].clone())
            .ok_or_else(|| StorageError::not_found(FREEZE_INTENTS, intent_id))
    }

    async fn list_freeze_intents(
        &self,
        status: Option<IntentStatus>,
    ) -> Result<Vec<FreezeIntent>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .intents
            .iter()
            .filter(|i| status.map_or(true, |s| i.status == s))
            .cloned()
            .collect())
    }

    async fn update_freeze_intent(&self, intent: FreezeIntent) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let idx = *inner
            .intent_index
            .get(&intent.id)
            .ok_or_else(|| StorageError::not_found(FREEZE_INTENTS, &intent.id))?;
        inner.intents[idx] = intent;
        Ok(())
    }
}
