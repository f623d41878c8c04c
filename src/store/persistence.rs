//! Snapshot persistence for durable stores

use super::engine::{EntityTable, StoreState};
use crate::core::{Result, StoreError};
use chrono::{DateTime, Utc};
use im::OrdMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const SNAPSHOT_FORMAT_VERSION: u16 = 1;

// ============================================================================
// Store Snapshot
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub format_version: u16,
    pub schema_version: u32,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub entities: OrdMap<String, EntityTable>,
}

impl StoreSnapshot {
    pub fn new(name: &str, schema_version: u32, state: &StoreState) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            schema_version,
            name: name.to_string(),
            created_at: Utc::now(),
            entities: state.entities.clone(),
        }
    }

    /// Decode a (possibly migrated) snapshot document
    pub fn from_document(document: serde_json::Value) -> Result<Self> {
        let snapshot: Self = serde_json::from_value(document)
            .map_err(|e| StoreError::StoreOpen(format!("Malformed snapshot: {}", e)))?;
        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(StoreError::StoreOpen(format!(
                "Snapshot format {} is newer than supported format {}",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(snapshot)
    }

    pub fn record_count(&self) -> usize {
        self.entities.values().map(|table| table.len()).sum()
    }

    pub fn into_state(self) -> StoreState {
        StoreState {
            entities: self.entities,
        }
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }

    /// Write the snapshot atomically: temp file in the same directory, fsync, rename.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot)
            .map_err(|e| StoreError::Commit(format!("Failed to serialize snapshot: {}", e)))?;
        self.write_atomic(&bytes)
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<()> {
        let parent = self
            .snapshot_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| {
            StoreError::Commit(format!("Failed to create snapshot directory: {}", e))
        })?;

        let mut temp = NamedTempFile::new_in(parent)
            .map_err(|e| StoreError::Commit(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(bytes)
            .map_err(|e| StoreError::Commit(format!("Failed to write snapshot: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| StoreError::Commit(format!("Failed to sync snapshot: {}", e)))?;
        temp.persist(&self.snapshot_path)
            .map_err(|e| StoreError::Commit(format!("Failed to rename snapshot: {}", e)))?;
        Ok(())
    }

    /// Raw snapshot document, before migrations run
    pub fn load_document(&self) -> Result<Option<serde_json::Value>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.snapshot_path)
            .map_err(|e| StoreError::StoreOpen(format!("Failed to read snapshot: {}", e)))?;
        let document = serde_json::from_slice(&data)
            .map_err(|e| StoreError::StoreOpen(format!("Failed to parse snapshot: {}", e)))?;
        Ok(Some(document))
    }

    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        self.load_document()?
            .map(StoreSnapshot::from_document)
            .transpose()
    }
}
