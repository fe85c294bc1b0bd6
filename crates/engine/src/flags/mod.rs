//! Feature flag store.
//!
//! Runtime-switchable boolean capabilities backed by a single flag document:
//!
//! - Reads go through a [`SnapshotCache`] shared by every flag; a snapshot
//!   lives for the cache TTL (60 s by default).
//! - A failed read never reaches the caller: the flag's static default is
//!   returned instead, so flag unavailability cannot block a transition.
//! - Writes are durable, append to the flag's change history, and drop the
//!   whole snapshot so the next read goes back to storage. A read already in
//!   flight when the write lands returns its values but does not cache them.
//! - The flag document is created from registry defaults the first time it
//!   is found missing.

mod cache;
mod registry;

use std::sync::Arc;

use caseflow_storage::{DocumentStore, FlagChange, FlagDocument, StorageError};
use time::Duration;

use crate::clock::Clock;

pub use cache::{FlagValues, SnapshotCache, DEFAULT_FLAG_TTL};
pub use registry::{
    default_document, default_values, lookup, FlagDefinition, FLAG_DOCUMENT_VERSION,
    FLAG_REGISTRY, FROZEN_TASKS_ON_STAGE_CHANGE,
};

#[derive(Debug, thiserror::Error)]
pub enum FlagError {
    #[error("unknown feature flag: {0}")]
    UnknownFlag(String),

    #[error("feature flag value must be boolean, got {0}")]
    NonBoolean(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A flag value checked at the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagValue(pub bool);

impl FlagValue {
    /// Accept only JSON booleans; `"true"`, `1` and `null` are rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, FlagError> {
        value
            .as_bool()
            .map(FlagValue)
            .ok_or_else(|| FlagError::NonBoolean(value.to_string()))
    }
}

pub struct FlagStore<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    cache: SnapshotCache,
    registry: &'static [FlagDefinition],
}

impl<S: DocumentStore> FlagStore<S> {
    /// A store over [`FLAG_REGISTRY`] with the default TTL.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        let cache = SnapshotCache::new(clock.clone(), DEFAULT_FLAG_TTL);
        Self::with_cache(store, clock, cache)
    }

    pub fn with_cache(store: Arc<S>, clock: Arc<dyn Clock>, cache: SnapshotCache) -> Self {
        Self {
            store,
            clock,
            cache,
            registry: FLAG_REGISTRY,
        }
    }

    pub fn with_ttl(store: Arc<S>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        let cache = SnapshotCache::new(clock.clone(), ttl);
        Self::with_cache(store, clock, cache)
    }

    /// Replace the flag registry (tests use registries with `true` defaults).
    pub fn with_registry(mut self, registry: &'static [FlagDefinition]) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &'static [FlagDefinition] {
        self.registry
    }

    /// Current value of `name`. Never fails.
    pub async fn get(&self, name: &str) -> bool {
        let Some(def) = lookup(self.registry, name) else {
            tracing::warn!(flag = name, "unknown feature flag");
            return false;
        };

        if let Some(values) = self.cache.fresh().await {
            return values.get(name).copied().unwrap_or(def.default_value);
        }

        match self.load().await {
            Ok(values) => values.get(name).copied().unwrap_or(def.default_value),
            Err(e) => {
                tracing::error!(
                    flag = name,
                    error = %e,
                    default = def.default_value,
                    "flag read failed, using static default"
                );
                def.default_value
            }
        }
    }

    /// Durably set `name` to `value` on behalf of `actor`.
    pub async fn set(&self, name: &str, value: bool, actor: &str) -> Result<(), FlagError> {
        if lookup(self.registry, name).is_none() {
            return Err(FlagError::UnknownFlag(name.to_string()));
        }

        let change = FlagChange {
            value,
            changed_by: actor.to_string(),
            changed_at: self.clock.timestamp(),
        };
        match self.store.update_flag(name, change.clone()).await {
            Err(StorageError::NotFound { .. }) => {
                self.initialize().await?;
                self.store.update_flag(name, change).await?;
            }
            other => other?,
        }

        self.cache.invalidate().await;
        tracing::info!(flag = name, value, actor, "feature flag updated");
        Ok(())
    }

    /// Like [`set`](Self::set), for a raw JSON value from the transport.
    pub async fn set_json(
        &self,
        name: &str,
        value: &serde_json::Value,
        actor: &str,
    ) -> Result<(), FlagError> {
        if lookup(self.registry, name).is_none() {
            return Err(FlagError::UnknownFlag(name.to_string()));
        }
        let FlagValue(value) = FlagValue::from_json(value)?;
        self.set(name, value, actor).await
    }

    /// The full flag document, created from defaults if missing.
    pub async fn all(&self) -> Result<FlagDocument, FlagError> {
        if let Some(doc) = self.store.get_flag_document().await? {
            return Ok(doc);
        }
        self.initialize().await?;
        match self.store.get_flag_document().await? {
            Some(doc) => Ok(doc),
            None => Ok(default_document(self.registry, &self.clock.timestamp())),
        }
    }

    /// Create the flag document from registry defaults.
    ///
    /// Returns `false` if another writer created it first.
    pub async fn initialize(&self) -> Result<bool, FlagError> {
        let doc = default_document(self.registry, &self.clock.timestamp());
        match self.store.create_flag_document(doc).await {
            Ok(()) => {
                tracing::info!(flags = self.registry.len(), "feature flags initialized");
                Ok(true)
            }
            Err(StorageError::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.invalidate().await;
    }

    async fn load(&self) -> Result<FlagValues, StorageError> {
        let generation = self.cache.generation();
        match self.store.get_flag_document().await? {
            Some(doc) => {
                let values: FlagValues = Arc::new(doc.flags);
                if !self.cache.store_if(values.clone(), generation).await {
                    tracing::debug!("flags changed during read, snapshot not cached");
                }
                Ok(values)
            }
            None => {
                if let Err(e) = self.initialize().await {
                    tracing::error!(error = %e, "could not initialize feature flags");
                }
                Ok(Arc::new(default_values(self.registry)))
            }
        }
    }
}
