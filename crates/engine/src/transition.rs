//! Stage Transition Engine.
//!
//! One call to [`TransitionEngine::transition`] moves a case from its active
//! stage to the next one:
//!
//! 1. reject callers without a principal, before touching storage,
//! 2. validate the request,
//! 3. load the case and check the declared stages against it,
//! 4. complete the vacated stage and activate the target, and read the
//!    freeze flag,
//! 5. commit the case with a version check, together with a pending
//!    [`FreezeIntent`] carrying the flag value and describing the freeze
//!    work owed,
//! 6. drain that intent inline (see [`outbox`](crate::outbox)).
//!
//! Steps 1-4 write nothing. Step 5 is one atomic unit. If step 6 fails the
//! case stays advanced and the intent stays pending; the caller gets
//! [`EngineError::FreezeIncomplete`] and retries the intent, not the
//! transition.

use std::sync::Arc;

use caseflow_storage::{
    CaseCommit, CaseRecord, DocumentStore, FreezeIntent, IntentStatus, StageStatus, StorageError,
    TaskMutation,
};
use serde::Serialize;

use crate::audit::{AuditEntry, AuditSink};
use crate::batch::BatchExecutor;
use crate::clock::Clock;
use crate::config::{EngineConfig, StageCheck};
use crate::error::EngineError;
use crate::flags::{FlagStore, FROZEN_TASKS_ON_STAGE_CHANGE};
use crate::principal::Principal;
use crate::request::{TransitionRequest, UnfreezeRequest, ValidatedTransition};

/// Wire result of a successful transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResult {
    pub success: bool,
    pub case_id: String,
    pub from: String,
    pub to: String,
    pub to_name: String,
    pub frozen_tasks: usize,
    pub feature_enabled: bool,
    pub timestamp: String,
    pub intent_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnfreezeResult {
    pub success: bool,
    pub task_id: String,
}

pub struct TransitionEngine<S> {
    pub(crate) store: Arc<S>,
    pub(crate) flags: Arc<FlagStore<S>>,
    pub(crate) executor: BatchExecutor<S>,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) clock: Arc<dyn Clock>,
    stage_check: StageCheck,
}

impl<S: DocumentStore> TransitionEngine<S> {
    pub fn new(
        store: Arc<S>,
        flags: Arc<FlagStore<S>>,
        executor: BatchExecutor<S>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            flags,
            executor,
            audit,
            clock,
            stage_check: StageCheck::default(),
        }
    }

    /// Wire an engine, its flag store and its executor from one config.
    pub fn from_config(
        store: Arc<S>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        let flags = Arc::new(FlagStore::with_ttl(
            store.clone(),
            clock.clone(),
            config.flag_cache_ttl(),
        ));
        let executor = BatchExecutor::new(store.clone(), config.max_ops_per_commit);
        Self::new(store, flags, executor, audit, clock).with_stage_check(config.stage_check)
    }

    pub fn with_stage_check(mut self, stage_check: StageCheck) -> Self {
        self.stage_check = stage_check;
        self
    }

    pub fn flags(&self) -> &Arc<FlagStore<S>> {
        &self.flags
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn transition(
        &self,
        request: TransitionRequest,
        principal: Option<&Principal>,
    ) -> Result<TransitionResult, EngineError> {
        let principal = principal.ok_or(EngineError::Unauthenticated)?;
        let req = request.validate()?;
        let actor = principal.actor().to_string();

        let mut case = self
            .store
            .get_case(&req.case_id)
            .await
            .map_err(|e| storage_error("load case", "case", &req.case_id, e))?;
        let expected_version = case.version;
        let now = self.clock.timestamp();

        let service_id = advance(&mut case, &req, self.stage_check, &now)?;
        case.current_stage = Some(req.new_stage_id.clone());
        case.current_stage_name = Some(req.new_stage_name.clone());
        case.stage_changed_at = Some(now.clone());
        case.stage_changed_by = Some(actor.clone());
        case.updated_at = Some(now.clone());

        // Captured with the commit so later drains honor the value in effect now.
        let freeze_enabled = self.flags.get(FROZEN_TASKS_ON_STAGE_CHANGE).await;
        let intent = FreezeIntent {
            id: format!("{}:{}", req.case_id, expected_version + 1),
            case_id: req.case_id.clone(),
            service_id: service_id.clone(),
            from_stage: req.current_stage_id.clone(),
            to_stage: req.new_stage_id.clone(),
            to_stage_name: req.new_stage_name.clone(),
            requested_by: actor.clone(),
            created_at: now.clone(),
            status: IntentStatus::Pending,
            freeze_enabled,
            frozen_count: 0,
            attempts: 0,
            completed_at: None,
            last_error: None,
        };
        let intent_id = intent.id.clone();

        let version = self
            .store
            .commit_case_transition(CaseCommit {
                case,
                expected_version,
                intent: Some(intent.clone()),
            })
            .await
            .map_err(|e| match e {
                StorageError::ConcurrentConflict { .. } => {
                    tracing::warn!(case_id = %req.case_id, error = %e, "stale case write rejected");
                    EngineError::ConcurrentModification {
                        case_id: req.case_id.clone(),
                    }
                }
                other => storage_error("commit case", "case", &req.case_id, other),
            })?;

        tracing::info!(
            case_id = %req.case_id,
            service_id = %service_id,
            from = %req.current_stage_id,
            to = %req.new_stage_id,
            version,
            actor = %actor,
            "stage transition committed"
        );
        self.record(AuditEntry {
            action: "stage_transition".to_string(),
            actor: actor.clone(),
            subject: req.case_id.clone(),
            detail: serde_json::json!({
                "serviceId": service_id,
                "from": req.current_stage_id,
                "to": req.new_stage_id,
                "toName": req.new_stage_name,
                "version": version,
                "intentId": intent_id,
            }),
            at: now.clone(),
        })
        .await;

        let drained = self.run_intent(intent).await?;

        Ok(TransitionResult {
            success: true,
            case_id: req.case_id,
            from: req.current_stage_id,
            to: req.new_stage_id,
            to_name: req.new_stage_name,
            frozen_tasks: drained.frozen_count,
            feature_enabled: drained.freeze_enabled,
            timestamp: now,
            intent_id,
        })
    }

    /// Clear the freeze marker on one task.
    pub async fn unfreeze(
        &self,
        request: UnfreezeRequest,
        principal: Option<&Principal>,
    ) -> Result<UnfreezeResult, EngineError> {
        let principal = principal.ok_or(EngineError::Unauthenticated)?;
        let task_id = request.validate()?;
        let actor = principal.actor().to_string();
        let now = self.clock.timestamp();

        let mutation = TaskMutation::Unfreeze {
            actor: actor.clone(),
            at: now.clone(),
        };
        self.store
            .update_task(&task_id, &mutation)
            .await
            .map_err(|e| storage_error("unfreeze task", "task", &task_id, e))?;

        tracing::info!(task_id = %task_id, actor = %actor, "task unfrozen");
        self.record(AuditEntry {
            action: "task_unfrozen".to_string(),
            actor,
            subject: task_id.clone(),
            detail: serde_json::Value::Null,
            at: now,
        })
        .await;

        Ok(UnfreezeResult {
            success: true,
            task_id,
        })
    }

    /// Append to the audit trail. State is already committed, so failures
    /// are logged and swallowed.
    pub(crate) async fn record(&self, entry: AuditEntry) {
        let action = entry.action.clone();
        if let Err(e) = self.audit.append(entry).await {
            tracing::warn!(action = %action, error = %e, "audit append failed");
        }
    }
}

/// Map a storage failure: `NotFound` keeps its meaning, anything else is
/// logged and becomes opaque.
pub(crate) fn storage_error(
    operation: &str,
    kind: &'static str,
    id: &str,
    error: StorageError,
) -> EngineError {
    if error.is_not_found() {
        EngineError::NotFound {
            kind,
            id: id.to_string(),
        }
    } else {
        EngineError::internal(operation, error)
    }
}

/// Check the declared stages against `case` and rewrite the service's stage
/// list in place. Returns the id of the service that was advanced.
fn advance(
    case: &mut CaseRecord,
    req: &ValidatedTransition,
    check: StageCheck,
    now: &str,
) -> Result<String, EngineError> {
    let mismatch = |reason: String| EngineError::StageMismatch {
        case_id: case.id.clone(),
        reason,
    };

    let service_id = match &req.service_id {
        Some(id) => {
            if case.service(id).is_none() {
                return Err(EngineError::NotFound {
                    kind: "service",
                    id: id.clone(),
                });
            }
            id.clone()
        }
        None => match (
            case.service_containing_stage(&req.current_stage_id),
            check,
        ) {
            (Some(service), _) => service.id.clone(),
            (None, StageCheck::Lenient) => case
                .service_containing_stage(&req.new_stage_id)
                .map(|s| s.id.clone())
                .ok_or_else(|| {
                    mismatch(format!("no service declares stage '{}'", req.new_stage_id))
                })?,
            (None, StageCheck::Strict) => {
                return Err(mismatch(format!(
                    "no service declares stage '{}'",
                    req.current_stage_id
                )))
            }
        },
    };

    let Some(service) = case.service(&service_id) else {
        return Err(EngineError::internal(
            "advance stage",
            format!("service '{service_id}' vanished from case '{}'", case.id),
        ));
    };

    match service.stage(&req.new_stage_id) {
        None => {
            return Err(mismatch(format!(
                "stage '{}' is not part of service '{service_id}'",
                req.new_stage_id
            )))
        }
        Some(target) if !target.status.can_transition_to(StageStatus::Active) => {
            return Err(mismatch(format!(
                "stage '{}' is {}, expected pending",
                target.id,
                target.status.as_str()
            )))
        }
        Some(_) => {}
    }

    match service.stage(&req.current_stage_id) {
        Some(from) if !from.status.can_transition_to(StageStatus::Completed) => {
            return Err(mismatch(format!(
                "stage '{}' is {}, expected active",
                from.id,
                from.status.as_str()
            )));
        }
        Some(_) => {}
        None if check == StageCheck::Lenient => {
            tracing::warn!(
                case_id = %case.id,
                stage_id = %req.current_stage_id,
                "vacated stage not declared, advancing anyway"
            );
        }
        None => {
            return Err(mismatch(format!(
                "stage '{}' is not part of service '{service_id}'",
                req.current_stage_id
            )))
        }
    }

    if let Some(other) = service
        .active_stages()
        .find(|s| s.id != req.current_stage_id)
    {
        return Err(mismatch(format!(
            "stage '{}' is already active in service '{service_id}'",
            other.id
        )));
    }

    let case_id = case.id.clone();
    let service = case.service_mut(&service_id).ok_or_else(|| {
        EngineError::internal(
            "advance stage",
            format!("service '{service_id}' vanished from case '{case_id}'"),
        )
    })?;
    for stage in &mut service.stages {
        if stage.id == req.current_stage_id {
            stage.status = StageStatus::Completed;
            stage.completed_at = Some(now.to_string());
        } else if stage.id == req.new_stage_id {
            stage.status = StageStatus::Active;
            stage.started_at = Some(now.to_string());
        }
    }
    Ok(service_id)
}
