//! Credential lookup injected into stages at construction.
//!
//! Each stage asks for its own credential by name; there is no shared
//! mutable "current key".

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// A secret handed to a stage. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The secret itself. Avoid logging it.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

pub trait CredentialProvider: Send + Sync {
    /// Credential for `stage`, if one is configured.
    fn credential_for(&self, stage: &str) -> Option<Credential>;
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads credentials from environment variables.
///
/// A stage mapped to its own variable uses that variable when it is set and
/// non-empty; otherwise the fallback variable is consulted.
#[derive(Clone)]
pub struct EnvCredentialProvider {
    stage_vars: BTreeMap<String, String>,
    fallback: Option<String>,
    lookup: EnvLookup,
}

impl EnvCredentialProvider {
    /// Provider backed by the process environment.
    pub fn new(stage_vars: BTreeMap<String, String>, fallback: Option<String>) -> Self {
        Self::with_lookup(stage_vars, fallback, |name| std::env::var(name).ok())
    }

    /// Provider backed by a custom variable lookup.
    pub fn with_lookup<F>(
        stage_vars: BTreeMap<String, String>,
        fallback: Option<String>,
        lookup: F,
    ) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            stage_vars,
            fallback,
            lookup: Arc::new(lookup),
        }
    }

    /// Variable consulted first for `stage`.
    #[must_use]
    pub fn variable_for(&self, stage: &str) -> Option<&str> {
        self.stage_vars
            .get(stage)
            .map(String::as_str)
            .or(self.fallback.as_deref())
    }

    fn read(&self, name: &str) -> Option<Credential> {
        (self.lookup)(name)
            .filter(|value| !value.trim().is_empty())
            .map(Credential)
    }
}

impl fmt::Debug for EnvCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvCredentialProvider")
            .field("stage_vars", &self.stage_vars)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn credential_for(&self, stage: &str) -> Option<Credential> {
        self.stage_vars
            .get(stage)
            .and_then(|name| self.read(name))
            .or_else(|| self.fallback.as_deref().and_then(|name| self.read(name)))
    }
}

/// Fixed credentials, mainly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    per_stage: HashMap<String, Credential>,
    default: Option<Credential>,
}

impl StaticCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>, secret: impl Into<String>) -> Self {
        self.per_stage.insert(stage.into(), Credential::new(secret));
        self
    }

    #[must_use]
    pub fn with_default(mut self, secret: impl Into<String>) -> Self {
        self.default = Some(Credential::new(secret));
        self
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn credential_for(&self, stage: &str) -> Option<Credential> {
        self.per_stage
            .get(stage)
            .or(self.default.as_ref())
            .cloned()
    }
}
