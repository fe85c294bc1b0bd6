//! The closed registry of runtime feature flags and their static defaults.

use std::collections::BTreeMap;

use caseflow_storage::{FlagDocument, FlagMetadata};

/// Freeze open tasks of the vacated stage when a case changes stage.
pub const FROZEN_TASKS_ON_STAGE_CHANGE: &str = "FROZEN_TASKS_ON_STAGE_CHANGE";

/// Schema version written into freshly initialised flag documents.
pub const FLAG_DOCUMENT_VERSION: &str = "1.0.0";

/// Static description of one flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagDefinition {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub default_value: bool,
    pub version: &'static str,
    pub created_at: &'static str,
    pub owner: &'static str,
}

impl FlagDefinition {
    pub fn metadata(&self) -> FlagMetadata {
        FlagMetadata {
            name: self.name.to_string(),
            description: self.description.to_string(),
            default_value: self.default_value,
            version: self.version.to_string(),
            created_at: self.created_at.to_string(),
            owner: self.owner.to_string(),
        }
    }
}

/// Every flag the system knows about. Unknown names read as `false`.
pub static FLAG_REGISTRY: &[FlagDefinition] = &[FlagDefinition {
    key: FROZEN_TASKS_ON_STAGE_CHANGE,
    name: "Frozen Tasks on Stage Change",
    description: "Mark open tasks of the previous stage as frozen when a case moves to the next stage",
    // Off until explicitly enabled.
    default_value: false,
    version: "1.0.0",
    created_at: "2025-01-26",
    owner: "system",
}];

pub fn lookup<'r>(registry: &'r [FlagDefinition], key: &str) -> Option<&'r FlagDefinition> {
    registry.iter().find(|d| d.key == key)
}

/// Flag values as they stand before any administrative write.
pub fn default_values(registry: &[FlagDefinition]) -> BTreeMap<String, bool> {
    registry
        .iter()
        .map(|d| (d.key.to_string(), d.default_value))
        .collect()
}

/// A flag document populated with every registry default.
pub fn default_document(registry: &[FlagDefinition], now: &str) -> FlagDocument {
    FlagDocument {
        flags: default_values(registry),
        metadata: registry
            .iter()
            .map(|d| (d.key.to_string(), d.metadata()))
            .collect(),
        history: BTreeMap::new(),
        created_at: now.to_string(),
        updated_at: now.to_string(),
        last_changed_by: None,
        schema_version: FLAG_DOCUMENT_VERSION.to_string(),
    }
}
