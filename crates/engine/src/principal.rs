//! Authenticated principals and how they are resolved from bearer tokens.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The caller identity injected by the hosting transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Principal {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// The name recorded in "changed by" fields: email when known, else uid.
    pub fn actor(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.uid)
    }
}

/// Resolves an opaque bearer token to a principal.
pub trait PrincipalResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Option<Principal>;
}

/// A fixed token table, loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticPrincipalResolver {
    tokens: HashMap<String, Principal>,
}

impl StaticPrincipalResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, principal: Principal) {
        self.tokens.insert(token.into(), principal);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl PrincipalResolver for StaticPrincipalResolver {
    fn resolve(&self, token: &str) -> Option<Principal> {
        self.tokens.get(token).cloned()
    }
}
