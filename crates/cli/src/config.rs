//! Server configuration: a TOML file plus `CASEFLOW_*` environment overrides.
//!
//! ```toml
//! [server]
//! port = 8080
//!
//! [flags]
//! cache_ttl_secs = 60
//!
//! [batch]
//! max_ops_per_commit = 500
//!
//! [engine]
//! stage_check = "strict"
//!
//! [[principals]]
//! token = "dev-token"
//! uid = "u-1"
//! email = "clerk@firm.example"
//! ```

use std::path::{Path, PathBuf};

use caseflow_engine::{EngineConfig, Principal, StageCheck, StaticPrincipalResolver};
use caseflow_storage::MAX_BATCH_OPERATIONS;
use serde::Deserialize;

pub(crate) const ENV_PORT: &str = "CASEFLOW_PORT";
pub(crate) const ENV_FLAG_TTL: &str = "CASEFLOW_FLAG_TTL_SECS";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("could not read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct ServerSection {
    pub(crate) port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct FlagsSection {
    pub(crate) cache_ttl_secs: u64,
}

impl Default for FlagsSection {
    fn default() -> Self {
        Self { cache_ttl_secs: 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct BatchSection {
    pub(crate) max_ops_per_commit: usize,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            max_ops_per_commit: MAX_BATCH_OPERATIONS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct EngineSection {
    pub(crate) stage_check: StageCheck,
}

/// A bearer token accepted by the server and the principal it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct PrincipalEntry {
    pub(crate) token: String,
    pub(crate) uid: String,
    #[serde(default)]
    pub(crate) email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    pub(crate) server: ServerSection,
    pub(crate) flags: FlagsSection,
    pub(crate) batch: BatchSection,
    pub(crate) engine: EngineSection,
    pub(crate) principals: Vec<PrincipalEntry>,
}

impl Config {
    /// Load from `path` (defaults when `None`), then apply env overrides.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub(crate) fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override values from the environment, read through `lookup`.
    pub(crate) fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_PORT) {
            self.server.port = value.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_PORT,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_FLAG_TTL) {
            self.flags.cache_ttl_secs = value.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_FLAG_TTL,
                value: value.clone(),
            })?;
        }
        Ok(())
    }

    pub(crate) fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            stage_check: self.engine.stage_check,
            max_ops_per_commit: self.batch.max_ops_per_commit,
            flag_cache_ttl_secs: self.flags.cache_ttl_secs,
        }
    }

    pub(crate) fn principal_resolver(&self) -> StaticPrincipalResolver {
        let mut resolver = StaticPrincipalResolver::new();
        for entry in &self.principals {
            let mut principal = Principal::new(&entry.uid);
            if let Some(email) = &entry.email {
                principal = principal.with_email(email);
            }
            resolver.insert(&entry.token, principal);
        }
        resolver
    }
}
