//! Freeze intents: the outbox between a committed stage change and the
//! freeze of the vacated stage's tasks.
//!
//! Every transition writes a pending intent in the same atomic unit as the
//! case, carrying the freeze flag as read for that transition. Draining an
//! intent follows that recorded value, not the flag's current one, and either
//! freezes the open tasks (`completed`) or does nothing (`skipped`). A failed
//! drain leaves the intent pending with `last_error` set; draining it again
//! is safe because already-frozen tasks are filtered out.
//!
//! Tasks frozen by a drain carry the intent id. `frozen_count` is recounted
//! from those ids on every attempt, so it stays right even when an earlier
//! attempt froze tasks but could not save the intent.

use caseflow_storage::{
    DocumentStore, FreezeIntent, FreezeMark, IntentStatus, TaskMutation, TaskQuery, TaskStatus,
};
use serde::Serialize;

use crate::batch::BatchError;
use crate::error::EngineError;
use crate::principal::Principal;
use crate::transition::{storage_error, TransitionEngine};

/// Reason written on every task frozen by a stage change.
pub const FROZEN_REASON: &str = "stage_changed";

/// Summary of a [`TransitionEngine::drain_pending`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub attempted: usize,
    pub completed: usize,
    pub skipped: usize,
    pub frozen_tasks: usize,
    /// Ids of intents still pending after this pass.
    pub failed: Vec<String>,
}

impl<S: DocumentStore> TransitionEngine<S> {
    /// Intents whose freeze work has not finished.
    pub async fn pending_intents(
        &self,
        principal: Option<&Principal>,
    ) -> Result<Vec<FreezeIntent>, EngineError> {
        principal.ok_or(EngineError::Unauthenticated)?;
        self.store
            .list_freeze_intents(Some(IntentStatus::Pending))
            .await
            .map_err(|e| EngineError::internal("list freeze intents", e))
    }

    /// Re-run one intent. Finished intents are returned unchanged.
    pub async fn retry_intent(
        &self,
        intent_id: &str,
        principal: Option<&Principal>,
    ) -> Result<FreezeIntent, EngineError> {
        principal.ok_or(EngineError::Unauthenticated)?;
        if intent_id.trim().is_empty() {
            return Err(EngineError::invalid("intentId is required"));
        }
        let intent = self
            .store
            .get_freeze_intent(intent_id)
            .await
            .map_err(|e| storage_error("load freeze intent", "freeze intent", intent_id, e))?;
        self.run_intent(intent).await
    }

    /// Drain every pending intent, oldest first. One failing intent does not
    /// stop the others.
    pub async fn drain_pending(
        &self,
        principal: Option<&Principal>,
    ) -> Result<DrainReport, EngineError> {
        let pending = self.pending_intents(principal).await?;
        let mut report = DrainReport {
            attempted: pending.len(),
            ..DrainReport::default()
        };

        for intent in pending {
            let id = intent.id.clone();
            match self.run_intent(intent).await {
                Ok(done) if done.status == IntentStatus::Skipped => report.skipped += 1,
                Ok(done) => {
                    report.completed += 1;
                    report.frozen_tasks += done.frozen_count;
                }
                Err(_) => report.failed.push(id),
            }
        }

        tracing::info!(
            attempted = report.attempted,
            completed = report.completed,
            skipped = report.skipped,
            failed = report.failed.len(),
            "freeze intents drained"
        );
        Ok(report)
    }

    pub(crate) async fn run_intent(
        &self,
        mut intent: FreezeIntent,
    ) -> Result<FreezeIntent, EngineError> {
        if intent.status != IntentStatus::Pending {
            return Ok(intent);
        }
        intent.attempts += 1;

        if !intent.freeze_enabled {
            intent.status = IntentStatus::Skipped;
            intent.completed_at = Some(self.clock.timestamp());
            intent.last_error = None;
            // Nothing is owed; a pending copy left behind is skipped again.
            if let Err(e) = self.store.update_freeze_intent(intent.clone()).await {
                tracing::warn!(intent_id = %intent.id, error = %e, "could not mark freeze intent skipped");
            }
            tracing::debug!(intent_id = %intent.id, "freeze disabled, intent skipped");
            return Ok(intent);
        }

        match self.freeze_tasks(&intent).await {
            Ok(frozen) => {
                intent.frozen_count = frozen;
                intent.status = IntentStatus::Completed;
                intent.completed_at = Some(self.clock.timestamp());
                intent.last_error = None;
                self.save_intent(&intent).await?;
                tracing::info!(
                    intent_id = %intent.id,
                    case_id = %intent.case_id,
                    stage_id = %intent.from_stage,
                    frozen,
                    "tasks frozen"
                );
                Ok(intent)
            }
            Err((frozen, cause)) => {
                intent.frozen_count = frozen;
                intent.last_error = Some(cause.clone());
                tracing::error!(
                    intent_id = %intent.id,
                    case_id = %intent.case_id,
                    frozen,
                    error = %cause,
                    "freezing tasks did not complete"
                );
                if let Err(e) = self.store.update_freeze_intent(intent.clone()).await {
                    tracing::error!(intent_id = %intent.id, error = %e, "could not record freeze failure");
                }
                Err(incomplete(&intent))
            }
        }
    }

    /// Freeze the open tasks of the vacated stage and return how many of
    /// them now carry this intent's id. On failure the count covers what was
    /// frozen before the failure.
    async fn freeze_tasks(&self, intent: &FreezeIntent) -> Result<usize, (usize, String)> {
        let query = TaskQuery {
            case_id: Some(intent.case_id.clone()),
            stage_id: Some(intent.from_stage.clone()),
            exclude_statuses: TaskStatus::TERMINAL.to_vec(),
            frozen: None,
        };
        let candidates = self
            .store
            .query_tasks(&query)
            .await
            .map_err(|e| (intent.frozen_count, e.to_string()))?;
        let already = candidates
            .iter()
            .filter(|task| {
                task.freeze.is_frozen
                    && task.freeze.freeze_intent_id.as_deref() == Some(intent.id.as_str())
            })
            .count();

        let mutation = TaskMutation::Freeze(FreezeMark {
            reason: FROZEN_REASON.to_string(),
            original_stage: intent.from_stage.clone(),
            moved_to_stage: intent.to_stage.clone(),
            moved_to_stage_name: intent.to_stage_name.clone(),
            frozen_at: self.clock.timestamp(),
            intent_id: Some(intent.id.clone()),
        });
        match self.executor.apply(candidates, &mutation).await {
            Ok(outcome) => Ok(already + outcome.mutated),
            Err(BatchError::GroupFailed { mutated, source, .. }) => {
                Err((already + mutated, source.to_string()))
            }
            Err(e) => Err((already, e.to_string())),
        }
    }

    async fn save_intent(&self, intent: &FreezeIntent) -> Result<(), EngineError> {
        self.store
            .update_freeze_intent(intent.clone())
            .await
            .map_err(|e| {
                tracing::error!(intent_id = %intent.id, error = %e, "could not save freeze intent");
                incomplete(intent)
            })
    }
}

fn incomplete(intent: &FreezeIntent) -> EngineError {
    EngineError::FreezeIncomplete {
        case_id: intent.case_id.clone(),
        intent_id: intent.id.clone(),
    }
}
