//! Stage transition engine for multi-stage billable cases.
//!
//! [`TransitionEngine`] advances a case's active stage and, when the
//! `FROZEN_TASKS_ON_STAGE_CHANGE` flag is on, freezes the open tasks of the
//! stage it left through the [`BatchExecutor`]. Flags are served by
//! [`FlagStore`].

pub mod audit;
pub mod batch;
pub mod clock;
pub mod config;
mod error;
pub mod flags;
mod outbox;
pub mod principal;
mod request;
mod transition;

pub use audit::{AuditEntry, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use batch::{BatchError, BatchExecutor, BatchOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, StageCheck};
pub use error::{EngineError, ErrorCode};
pub use flags::{FlagError, FlagStore, FlagValue, FROZEN_TASKS_ON_STAGE_CHANGE};
pub use outbox::{DrainReport, FROZEN_REASON};
pub use principal::{Principal, PrincipalResolver, StaticPrincipalResolver};
pub use request::{TransitionRequest, UnfreezeRequest, ValidatedTransition};
pub use transition::{TransitionEngine, TransitionResult, UnfreezeResult};
