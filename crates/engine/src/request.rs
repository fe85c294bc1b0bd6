//! Request payloads and their validation.
//!
//! Payloads arrive with every field optional so that a missing field is
//! reported as `invalid-argument` rather than as a decode failure.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    #[serde(default)]
    pub case_id: Option<String>,
    #[serde(default)]
    pub current_stage_id: Option<String>,
    #[serde(default)]
    pub new_stage_id: Option<String>,
    #[serde(default)]
    pub new_stage_name: Option<String>,
    #[serde(default)]
    pub service_id: Option<String>,
}

/// A transition request with every required field present and non-blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTransition {
    pub case_id: String,
    pub current_stage_id: String,
    pub new_stage_id: String,
    pub new_stage_name: String,
    /// `None` means: the service declaring `current_stage_id`.
    pub service_id: Option<String>,
}

fn required(field: &str, value: Option<String>) -> Result<String, EngineError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(EngineError::invalid(format!("{field} is required"))),
    }
}

impl TransitionRequest {
    pub fn new(
        case_id: impl Into<String>,
        current_stage_id: impl Into<String>,
        new_stage_id: impl Into<String>,
        new_stage_name: impl Into<String>,
    ) -> Self {
        Self {
            case_id: Some(case_id.into()),
            current_stage_id: Some(current_stage_id.into()),
            new_stage_id: Some(new_stage_id.into()),
            new_stage_name: Some(new_stage_name.into()),
            service_id: None,
        }
    }

    pub fn in_service(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }

    pub fn validate(self) -> Result<ValidatedTransition, EngineError> {
        let case_id = required("caseId", self.case_id)?;
        let current_stage_id = required("currentStageId", self.current_stage_id)?;
        let new_stage_id = required("newStageId", self.new_stage_id)?;
        let new_stage_name = required("newStageName", self.new_stage_name)?;
        if current_stage_id == new_stage_id {
            return Err(EngineError::invalid(
                "currentStageId and newStageId must differ",
            ));
        }
        let service_id = self.service_id.filter(|s| !s.trim().is_empty());

        Ok(ValidatedTransition {
            case_id,
            current_stage_id,
            new_stage_id,
            new_stage_name,
            service_id,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnfreezeRequest {
    #[serde(default)]
    pub task_id: Option<String>,
}

impl UnfreezeRequest {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
        }
    }

    pub fn validate(self) -> Result<String, EngineError> {
        required("taskId", self.task_id)
    }
}
