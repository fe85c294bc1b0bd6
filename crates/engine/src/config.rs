use serde::{Deserialize, Serialize};

use caseflow_storage::MAX_BATCH_OPERATIONS;

/// How strictly the declared "from" stage must match the stored case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCheck {
    /// The vacated stage must exist and be active; the target must be pending.
    #[default]
    Strict,
    /// A missing vacated stage is tolerated. Completed stages are still never
    /// reactivated.
    Lenient,
}

/// Engine tunables, usually read from the `[engine]`, `[batch]` and
/// `[flags]` sections of the server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub stage_check: StageCheck,
    #[serde(default = "default_max_ops")]
    pub max_ops_per_commit: usize,
    #[serde(default = "default_ttl_secs")]
    pub flag_cache_ttl_secs: u64,
}

fn default_max_ops() -> usize {
    MAX_BATCH_OPERATIONS
}

fn default_ttl_secs() -> u64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stage_check: StageCheck::default(),
            max_ops_per_commit: default_max_ops(),
            flag_cache_ttl_secs: default_ttl_secs(),
        }
    }
}

impl EngineConfig {
    pub fn flag_cache_ttl(&self) -> time::Duration {
        time::Duration::seconds(i64::try_from(self.flag_cache_ttl_secs).unwrap_or(i64::MAX))
    }
}
