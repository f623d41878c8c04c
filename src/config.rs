use crate::context::MergePolicy;
use crate::core::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_COALESCE_WINDOW_MS: u64 = 100;
const DEFAULT_MAIN_CACHE_CAPACITY: usize = 1024;

/// Where the store keeps its records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreKind {
    /// Snapshot file under `dir`, rewritten atomically on every commit.
    Durable { dir: PathBuf },
    /// Memory only. Loads synchronously, shares one context for reads and writes
    /// and runs mutations inline.
    Ephemeral,
}

/// What a mutation resolves to when its commit fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommitFailurePolicy {
    /// Report to the error sink; the mutation still resolves with the caller's value.
    #[default]
    Report,
    /// Report to the error sink and resolve the mutation with `StoreError::Commit`.
    Surface,
}

/// Store bootstrap configuration
///
/// Built the same way as a connection config: start from a constructor
/// and chain setters.
///
/// # Examples
///
/// ```
/// use memostore::{StoreConfig, MergePolicy};
/// use std::time::Duration;
///
/// let config = StoreConfig::ephemeral("tasks")
///     .coalesce_window(Duration::from_millis(50))
///     .merge_policy(MergePolicy::StoreTrump);
/// assert!(config.is_ephemeral());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Store name, also the snapshot file stem
    pub name: String,

    /// Durable or in-memory backing
    pub kind: StoreKind,

    /// Coalescing window for change notifications
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,

    /// Merge policy applied to every context
    #[serde(default)]
    pub merge_policy: MergePolicy,

    /// Commit failure handling for mutations
    #[serde(default)]
    pub commit_failure: CommitFailurePolicy,

    /// Maximum number of records the main context keeps materialized
    #[serde(default = "default_main_cache_capacity")]
    pub main_cache_capacity: usize,
}

fn default_coalesce_window_ms() -> u64 {
    DEFAULT_COALESCE_WINDOW_MS
}

fn default_main_cache_capacity() -> usize {
    DEFAULT_MAIN_CACHE_CAPACITY
}

impl StoreConfig {
    /// In-memory store, used by tests and previews
    pub fn ephemeral(name: &str) -> Self {
        Self::with_kind(name, StoreKind::Ephemeral)
    }

    /// Store persisted under `dir`
    pub fn durable(name: &str, dir: impl Into<PathBuf>) -> Self {
        Self::with_kind(name, StoreKind::Durable { dir: dir.into() })
    }

    fn with_kind(name: &str, kind: StoreKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            coalesce_window_ms: DEFAULT_COALESCE_WINDOW_MS,
            merge_policy: MergePolicy::default(),
            commit_failure: CommitFailurePolicy::default(),
            main_cache_capacity: DEFAULT_MAIN_CACHE_CAPACITY,
        }
    }

    /// Load a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| StoreError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::InvalidConfig("Store name must not be empty".into()));
        }
        if self.name.contains(['/', '\\']) {
            return Err(StoreError::InvalidConfig(format!(
                "Store name '{}' must not contain path separators",
                self.name
            )));
        }
        if self.main_cache_capacity == 0 {
            return Err(StoreError::InvalidConfig(
                "main_cache_capacity must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Set the coalescing window
    pub fn coalesce_window(mut self, window: Duration) -> Self {
        self.coalesce_window_ms = window.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    /// Set the merge policy
    pub fn merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    /// Set the commit failure policy
    pub fn commit_failure(mut self, policy: CommitFailurePolicy) -> Self {
        self.commit_failure = policy;
        self
    }

    /// Set the main context cache capacity
    pub fn main_cache_capacity(mut self, capacity: usize) -> Self {
        self.main_cache_capacity = capacity;
        self
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self.kind, StoreKind::Ephemeral)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    /// Snapshot file path for durable stores
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        match &self.kind {
            StoreKind::Durable { dir } => Some(dir.join(format!("{}.store.json", self.name))),
            StoreKind::Ephemeral => None,
        }
    }
}
