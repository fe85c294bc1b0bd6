use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Maximum number of write operations a single batch commit may carry.
pub const MAX_BATCH_OPERATIONS: usize = 500;

/// Collection names, used in error reporting and logs.
pub const CASES: &str = "cases";
pub const TASKS: &str = "tasks";
pub const FLAGS: &str = "system_settings/feature_flags";
pub const FREEZE_INTENTS: &str = "freeze_intents";

// ── Cases ────────────────────────────────────────────────────────────────────

/// Lifecycle status of a single stage. Edges are `pending -> active -> completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Active,
    Completed,
}

impl StageStatus {
    /// Whether moving from `self` to `next` follows the monotonic edge set.
    pub fn can_transition_to(self, next: StageStatus) -> bool {
        matches!(
            (self, next),
            (StageStatus::Pending, StageStatus::Active)
                | (StageStatus::Active, StageStatus::Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Active => "active",
            StageStatus::Completed => "completed",
        }
    }
}

/// One ordered phase of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub id: String,
    pub name: String,
    pub status: StageStatus,
    /// RFC 3339 timestamp string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// RFC 3339 timestamp string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

/// A billable engagement belonging to a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl Service {
    pub fn stage(&self, stage_id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }

    pub fn active_stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Active)
    }
}

/// A case document. The `current_stage*` fields mirror the active stage for
/// fast reads; `version` guards compare-and-swap writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRecord {
    pub id: String,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub current_stage: Option<String>,
    #[serde(default)]
    pub current_stage_name: Option<String>,
    #[serde(default)]
    pub stage_changed_at: Option<String>,
    #[serde(default)]
    pub stage_changed_by: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub version: i64,
}

impl CaseRecord {
    pub fn service(&self, service_id: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.id == service_id)
    }

    pub fn service_mut(&mut self, service_id: &str) -> Option<&mut Service> {
        self.services.iter_mut().find(|s| s.id == service_id)
    }

    /// The first service that declares a stage with this id.
    pub fn service_containing_stage(&self, stage_id: &str) -> Option<&Service> {
        self.services
            .iter()
            .find(|s| s.stages.iter().any(|st| st.id == stage_id))
    }
}

/// A version-checked case write, optionally coupled to a freeze intent that
/// is inserted in the same atomic unit.
#[derive(Debug, Clone)]
pub struct CaseCommit {
    pub case: CaseRecord,
    pub expected_version: i64,
    pub intent: Option<FreezeIntent>,
}

// ── Tasks ────────────────────────────────────────────────────────────────────

/// Lifecycle status of a task, independent of freeze state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Blocked,
    Closed,
    Done,
}

impl TaskStatus {
    pub const TERMINAL: [TaskStatus; 2] = [TaskStatus::Closed, TaskStatus::Done];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }
}

/// Freeze metadata carried by every task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreezeState {
    #[serde(default)]
    pub is_frozen: bool,
    #[serde(default)]
    pub frozen_reason: Option<String>,
    #[serde(default)]
    pub frozen_at: Option<String>,
    #[serde(default)]
    pub original_stage: Option<String>,
    #[serde(default)]
    pub moved_to_stage: Option<String>,
    #[serde(default)]
    pub moved_to_stage_name: Option<String>,
    #[serde(default)]
    pub unfrozen_at: Option<String>,
    #[serde(default)]
    pub unfrozen_by: Option<String>,
    /// Id of the freeze intent whose drain froze this task.
    #[serde(default)]
    pub freeze_intent_id: Option<String>,
}

/// A dependent record ("task") owned by one case and one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub case_id: String,
    pub stage_id: String,
    #[serde(default)]
    pub title: String,
    pub status: TaskStatus,
    #[serde(flatten)]
    pub freeze: FreezeState,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Field assignment for marking a task frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreezeMark {
    pub reason: String,
    pub original_stage: String,
    pub moved_to_stage: String,
    pub moved_to_stage_name: String,
    pub frozen_at: String,
    #[serde(default)]
    pub intent_id: Option<String>,
}

/// A uniform field-level update applied to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskMutation {
    Freeze(FreezeMark),
    Unfreeze { actor: String, at: String },
}

impl TaskMutation {
    /// True when the task is already in the state this mutation produces.
    pub fn is_satisfied_by(&self, task: &TaskRecord) -> bool {
        match self {
            TaskMutation::Freeze(_) => task.freeze.is_frozen,
            TaskMutation::Unfreeze { .. } => !task.freeze.is_frozen,
        }
    }

    pub fn apply_to(&self, task: &mut TaskRecord) {
        match self {
            TaskMutation::Freeze(mark) => {
                task.freeze.is_frozen = true;
                task.freeze.frozen_reason = Some(mark.reason.clone());
                task.freeze.frozen_at = Some(mark.frozen_at.clone());
                task.freeze.original_stage = Some(mark.original_stage.clone());
                task.freeze.moved_to_stage = Some(mark.moved_to_stage.clone());
                task.freeze.moved_to_stage_name = Some(mark.moved_to_stage_name.clone());
                task.freeze.freeze_intent_id = mark.intent_id.clone();
                task.updated_at = Some(mark.frozen_at.clone());
            }
            TaskMutation::Unfreeze { actor, at } => {
                task.freeze = FreezeState {
                    is_frozen: false,
                    unfrozen_at: Some(at.clone()),
                    unfrozen_by: Some(actor.clone()),
                    ..FreezeState::default()
                };
                task.updated_at = Some(at.clone());
            }
        }
    }
}

/// Filter for task queries. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub case_id: Option<String>,
    pub stage_id: Option<String>,
    pub exclude_statuses: Vec<TaskStatus>,
    pub frozen: Option<bool>,
}

impl TaskQuery {
    pub fn matches(&self, task: &TaskRecord) -> bool {
        if let Some(case_id) = &self.case_id {
            if &task.case_id != case_id {
                return false;
            }
        }
        if let Some(stage_id) = &self.stage_id {
            if &task.stage_id != stage_id {
                return false;
            }
        }
        if self.exclude_statuses.contains(&task.status) {
            return false;
        }
        if let Some(frozen) = self.frozen {
            if task.freeze.is_frozen != frozen {
                return false;
            }
        }
        true
    }
}

/// One write inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskWrite {
    pub task_id: String,
    pub mutation: TaskMutation,
}

/// An ordered group of task writes committed as one atomic unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskBatch {
    writes: Vec<TaskWrite>,
}

impl TaskBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            writes: Vec::with_capacity(capacity),
        }
    }

    pub fn update(&mut self, task_id: impl Into<String>, mutation: TaskMutation) {
        self.writes.push(TaskWrite {
            task_id: task_id.into(),
            mutation,
        });
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[TaskWrite] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<TaskWrite> {
        self.writes
    }
}

// ── Feature flags ────────────────────────────────────────────────────────────

/// Descriptive metadata for one registered flag, persisted alongside values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagMetadata {
    pub name: String,
    pub description: String,
    pub default_value: bool,
    pub version: String,
    pub created_at: String,
    pub owner: String,
}

/// One entry in a flag's append-only change history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagChange {
    pub value: bool,
    pub changed_by: String,
    /// RFC 3339 timestamp string.
    pub changed_at: String,
}

/// The single document holding every flag value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagDocument {
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
    #[serde(default)]
    pub metadata: BTreeMap<String, FlagMetadata>,
    #[serde(default)]
    pub history: BTreeMap<String, Vec<FlagChange>>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub last_changed_by: Option<String>,
    pub schema_version: String,
}

// ── Freeze intents (outbox) ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Written with the stage change, not yet drained.
    Pending,
    /// Drained with the freeze capability enabled.
    Completed,
    /// Drained with the freeze capability disabled.
    Skipped,
}

/// Record of the freeze work owed by one committed stage transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreezeIntent {
    pub id: String,
    pub case_id: String,
    pub service_id: String,
    pub from_stage: String,
    pub to_stage: String,
    pub to_stage_name: String,
    pub requested_by: String,
    pub created_at: String,
    pub status: IntentStatus,
    /// Flag value captured when the transition committed. Decides the
    /// outcome of every drain of this intent.
    #[serde(default)]
    pub freeze_enabled: bool,
    /// Tasks carrying this intent's id in their freeze metadata.
    #[serde(default)]
    pub frozen_count: usize,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
}
