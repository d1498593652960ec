//! Policy definition, loading and the shared policy handle

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use intent_schema::Action;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Policy error
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("Failed to read policy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse policy: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Static command policy.
///
/// Loaded at startup; afterwards only changed through [`PolicyHandle::update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Policy {
    /// Permitted action kinds
    pub action_whitelist: BTreeSet<Action>,
    /// Absolute path prefixes `open_file` may target
    pub path_whitelist: Vec<PathBuf>,
    /// Ask the operator before every command
    pub force_confirm: bool,
}

impl Default for Policy {
    fn default() -> Self {
        let mut path_whitelist = vec![PathBuf::from("/usr/bin/code")];
        if let Some(home) = dirs::home_dir() {
            path_whitelist.push(home.join("Downloads"));
        }

        Self {
            action_whitelist: Action::ALL.into_iter().collect(),
            path_whitelist,
            force_confirm: true,
        }
    }
}

impl Policy {
    /// Parse a TOML policy document. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, PolicyError> {
        let policy: Self = toml::from_str(contents)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Load and validate the policy file at `path`.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let contents = fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let policy = Self::from_toml_str(&contents)?;
        log::info!(
            "Loaded policy from {}: {} actions, {} path prefixes, force_confirm={}",
            path.display(),
            policy.action_whitelist.len(),
            policy.path_whitelist.len(),
            policy.force_confirm
        );
        Ok(policy)
    }

    /// Path prefixes must be absolute; a relative prefix would depend on the
    /// working directory of whoever runs the assistant.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if let Some(relative) = self.path_whitelist.iter().find(|p| !p.is_absolute()) {
            return Err(PolicyError::InvalidPolicy(format!(
                "path prefix {} is not absolute",
                relative.display()
            )));
        }
        Ok(())
    }
}

/// Process-wide policy shared by every request worker.
///
/// Readers take cheap snapshots; writers go through [`PolicyHandle::update`],
/// which is serialized by the write lock and validates before committing.
#[derive(Debug, Clone, Default)]
pub struct PolicyHandle {
    inner: Arc<RwLock<Policy>>,
}

impl PolicyHandle {
    pub fn new(policy: Policy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(policy)),
        }
    }

    /// Copy of the current policy; a request evaluates against one snapshot.
    pub async fn snapshot(&self) -> Policy {
        self.inner.read().await.clone()
    }

    /// Apply `change` to the policy. The change is discarded if the result
    /// does not validate. Returns the committed policy.
    pub async fn update<F>(&self, change: F) -> Result<Policy, PolicyError>
    where
        F: FnOnce(&mut Policy),
    {
        let mut guard = self.inner.write().await;
        let mut candidate = guard.clone();
        change(&mut candidate);
        candidate.validate()?;

        if *guard != candidate {
            log::info!(
                "Policy updated: force_confirm={}, actions={:?}, paths={:?}",
                candidate.force_confirm,
                candidate.action_whitelist,
                candidate.path_whitelist
            );
        }
        *guard = candidate.clone();
        Ok(candidate)
    }

    /// Settings toggle for global confirmation.
    pub async fn set_force_confirm(&self, enabled: bool) -> Policy {
        // Toggling a bool cannot invalidate the policy
        let mut guard = self.inner.write().await;
        guard.force_confirm = enabled;
        log::info!("Global confirmation {}", if enabled { "enabled" } else { "disabled" });
        guard.clone()
    }
}
