//! Batch Mutation Executor.
//!
//! Applies one uniform [`TaskMutation`] to an arbitrary number of tasks:
//!
//! 1. tasks already in the target state are filtered out,
//! 2. the rest are split, in discovery order, into commit groups no larger
//!    than the executor's ceiling,
//! 3. every group is submitted at once and all are awaited.
//!
//! Each group is atomic on its own. There is no atomicity across groups: if
//! group 2 fails, group 1 stays applied. Calling [`BatchExecutor::apply`]
//! again with the same candidates finishes the job. Step 1 only sees the
//! candidates as they were loaded, so the store re-checks every write inside
//! the group's commit and leaves tasks already in the target state alone.

use std::sync::Arc;

use caseflow_storage::{
    DocumentStore, StorageError, TaskBatch, TaskMutation, TaskRecord, MAX_BATCH_OPERATIONS,
};
use futures::future::join_all;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Loading a candidate by id failed.
    #[error("failed to load task '{task_id}': {source}")]
    Load {
        task_id: String,
        #[source]
        source: StorageError,
    },

    /// A commit group failed. `committed_groups` other groups, holding
    /// `mutated` records, were applied.
    #[error("commit group {group} of {groups} failed ({committed_groups} committed): {source}")]
    GroupFailed {
        group: usize,
        groups: usize,
        committed_groups: usize,
        mutated: usize,
        #[source]
        source: StorageError,
    },
}

/// Counts from one [`BatchExecutor::apply`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub candidates: usize,
    /// Records actually written.
    pub mutated: usize,
    /// Records already in the target state.
    pub skipped: usize,
    pub groups: usize,
}

pub struct BatchExecutor<S> {
    store: Arc<S>,
    max_ops: usize,
}

impl<S: DocumentStore> BatchExecutor<S> {
    /// `max_ops` is clamped to `1..=MAX_BATCH_OPERATIONS`.
    pub fn new(store: Arc<S>, max_ops: usize) -> Self {
        Self {
            store,
            max_ops: max_ops.clamp(1, MAX_BATCH_OPERATIONS),
        }
    }

    pub fn max_ops(&self) -> usize {
        self.max_ops
    }

    pub async fn apply(
        &self,
        candidates: Vec<TaskRecord>,
        mutation: &TaskMutation,
    ) -> Result<BatchOutcome, BatchError> {
        let total = candidates.len();
        let pending: Vec<TaskRecord> = candidates
            .into_iter()
            .filter(|task| !mutation.is_satisfied_by(task))
            .collect();

        let mut outcome = BatchOutcome {
            candidates: total,
            mutated: 0,
            skipped: total - pending.len(),
            groups: 0,
        };
        if pending.is_empty() {
            return Ok(outcome);
        }

        let batches: Vec<TaskBatch> = pending
            .chunks(self.max_ops)
            .map(|chunk| {
                let mut batch = TaskBatch::with_capacity(chunk.len());
                for task in chunk {
                    batch.update(task.id.clone(), mutation.clone());
                }
                batch
            })
            .collect();
        let groups = batches.len();
        tracing::debug!(
            candidates = total,
            pending = pending.len(),
            groups,
            max_ops = self.max_ops,
            "committing task batches"
        );

        let results = join_all(batches.into_iter().map(|batch| {
            let store = self.store.clone();
            async move {
                let size = batch.len();
                store
                    .commit_batch(batch)
                    .await
                    .map(|applied| (size, applied))
            }
        }))
        .await;

        let mut first_failure = None;
        let mut committed_groups = 0;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok((size, applied)) => {
                    committed_groups += 1;
                    outcome.mutated += applied;
                    outcome.skipped += size - applied;
                }
                Err(e) => {
                    tracing::warn!(group = index + 1, groups, error = %e, "commit group failed");
                    first_failure.get_or_insert((index + 1, e));
                }
            }
        }

        if let Some((group, source)) = first_failure {
            return Err(BatchError::GroupFailed {
                group,
                groups,
                committed_groups,
                mutated: outcome.mutated,
                source,
            });
        }

        outcome.groups = groups;
        Ok(outcome)
    }

    /// Load `task_ids` and apply `mutation` to them.
    pub async fn apply_by_id(
        &self,
        task_ids: &[String],
        mutation: &TaskMutation,
    ) -> Result<BatchOutcome, BatchError> {
        let mut candidates = Vec::with_capacity(task_ids.len());
        for id in task_ids {
            let task = self
                .store
                .get_task(id)
                .await
                .map_err(|source| BatchError::Load {
                    task_id: id.clone(),
                    source,
                })?;
            candidates.push(task);
        }
        self.apply(candidates, mutation).await
    }
}
