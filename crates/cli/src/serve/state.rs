//! Application state shared across request handlers.

use caseflow_engine::{StaticPrincipalResolver, TransitionEngine};
use caseflow_storage::MemoryStore;

pub(crate) struct AppState {
    pub(crate) engine: TransitionEngine<MemoryStore>,
    /// Bearer token -> principal. Unknown tokens resolve to no principal.
    pub(crate) principals: StaticPrincipalResolver,
}
