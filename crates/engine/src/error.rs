use std::fmt;

use serde::Serialize;

/// Wire-level error codes returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    Unauthenticated,
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    Aborted,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::InvalidArgument => "invalid-argument",
            ErrorCode::NotFound => "not-found",
            ErrorCode::FailedPrecondition => "failed-precondition",
            ErrorCode::Aborted => "aborted",
            ErrorCode::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by engine operations.
///
/// Display strings are safe to return to clients: `Internal` never carries
/// the underlying cause, which is logged server-side instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// The declared stage arrangement does not match the stored case.
    #[error("stage mismatch on case '{case_id}': {reason}")]
    StageMismatch { case_id: String, reason: String },

    /// The case changed between read and write; reload and retry.
    #[error("case '{case_id}' was modified concurrently; reload and retry")]
    ConcurrentModification { case_id: String },

    /// The stage change committed but the freeze step did not finish.
    /// Retry the freeze intent, not the transition.
    #[error(
        "case '{case_id}' advanced but freezing its tasks did not complete; retry freeze intent '{intent_id}'"
    )]
    FreezeIncomplete { case_id: String, intent_id: String },

    #[error("internal error")]
    Internal,
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Unauthenticated => ErrorCode::Unauthenticated,
            EngineError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            EngineError::NotFound { .. } => ErrorCode::NotFound,
            EngineError::StageMismatch { .. } => ErrorCode::FailedPrecondition,
            EngineError::ConcurrentModification { .. } => ErrorCode::Aborted,
            EngineError::FreezeIncomplete { .. } | EngineError::Internal => ErrorCode::Internal,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::ConcurrentModification { .. } | EngineError::FreezeIncomplete { .. }
        )
    }

    /// Log `cause` in full and return the opaque `Internal` error.
    pub fn internal(operation: &str, cause: impl fmt::Display) -> Self {
        tracing::error!(operation, error = %cause, "internal error");
        EngineError::Internal
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        EngineError::InvalidArgument(message.into())
    }
}
