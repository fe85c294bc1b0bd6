pub mod conformance;
mod error;
mod memory;
mod record;
pub mod testing;
mod traits;

pub use error::StorageError;
pub use memory::{MemoryStore, SeedData};
pub use record::{
    CaseCommit, CaseRecord, FlagChange, FlagDocument, FlagMetadata, FreezeIntent, FreezeMark,
    FreezeState, IntentStatus, Service, Stage, StageStatus, TaskBatch, TaskMutation, TaskQuery,
    TaskRecord, TaskStatus, TaskWrite, CASES, FLAGS, FREEZE_INTENTS, MAX_BATCH_OPERATIONS, TASKS,
};
pub use traits::DocumentStore;
