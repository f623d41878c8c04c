use super::change::Change;
use super::persistence::{SnapshotManager, StoreSnapshot};
use super::record::{PersistedRecord, RecordKey};
use crate::context::MergePolicy;
use crate::core::{Result, StoreError};
use im::OrdMap;
use std::collections::BTreeSet;
use std::sync::RwLock;

/// Records grouped by entity, then by id.
///
/// Structurally shared: cloning is O(1), so a commit builds the next state
/// next to the current one and only swaps it in once it is durable.
pub type EntityTable = OrdMap<String, PersistedRecord>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub entities: OrdMap<String, EntityTable>,
}

impl StoreState {
    pub fn get(&self, key: &RecordKey) -> Option<&PersistedRecord> {
        self.entities.get(&key.entity)?.get(&key.id)
    }

    pub fn record_count(&self) -> usize {
        self.entities.values().map(|table| table.len()).sum()
    }

    fn put(&mut self, record: PersistedRecord) {
        let mut table = self.entities.get(&record.entity).cloned().unwrap_or_default();
        let entity = record.entity.clone();
        table.insert(record.id.clone(), record);
        self.entities.insert(entity, table);
    }

    fn remove(&mut self, key: &RecordKey) -> bool {
        let Some(mut table) = self.entities.get(&key.entity).cloned() else {
            return false;
        };
        let removed = table.remove(&key.id).is_some();
        if table.is_empty() {
            self.entities.remove(&key.entity);
        } else {
            self.entities.insert(key.entity.clone(), table);
        }
        removed
    }
}

/// What one commit did to the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub written: Vec<RecordKey>,
    pub removed: Vec<RecordKey>,
    pub skipped: Vec<RecordKey>,
    pub entities: BTreeSet<String>,
}

impl CommitSummary {
    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.removed.is_empty()
    }
}

struct StoreInner {
    state: StoreState,
    schema_version: u32,
    /// Why the store refuses writes, if it does.
    unavailable: Option<String>,
}

/// The embedded object store every context reads from and commits into.
///
/// All access goes through one `RwLock`: readers share it, a commit holds
/// the write half while it merges and persists.
pub struct ObjectStore {
    name: String,
    persistence: Option<SnapshotManager>,
    inner: RwLock<StoreInner>,
}

impl ObjectStore {
    pub fn new(name: impl Into<String>, persistence: Option<SnapshotManager>) -> Self {
        Self {
            name: name.into(),
            persistence,
            inner: RwLock::new(StoreInner {
                state: StoreState::default(),
                schema_version: 1,
                unavailable: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_durable(&self) -> bool {
        self.persistence.is_some()
    }

    pub fn persistence(&self) -> Option<&SnapshotManager> {
        self.persistence.as_ref()
    }

    pub fn get(&self, key: &RecordKey) -> Result<Option<PersistedRecord>> {
        let inner = self.inner.read()?;
        Ok(inner.state.get(key).cloned())
    }

    /// Every stored record of one entity, ordered by id
    pub fn records(&self, entity: &str) -> Result<Vec<PersistedRecord>> {
        let inner = self.inner.read()?;
        Ok(inner
            .state
            .entities
            .get(entity)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    pub fn state(&self) -> Result<StoreState> {
        Ok(self.inner.read()?.state.clone())
    }

    pub fn schema_version(&self) -> Result<u32> {
        Ok(self.inner.read()?.schema_version)
    }

    /// Replace the whole state after a successful open
    pub fn install(&self, state: StoreState, schema_version: u32) -> Result<()> {
        let mut inner = self.inner.write()?;
        inner.state = state;
        inner.schema_version = schema_version;
        inner.unavailable = None;
        Ok(())
    }

    /// Refuse writes until the next successful `install`
    pub fn mark_unavailable(&self, reason: impl Into<String>) -> Result<()> {
        let mut inner = self.inner.write()?;
        inner.unavailable = Some(reason.into());
        Ok(())
    }

    pub fn is_available(&self) -> Result<bool> {
        Ok(self.inner.read()?.unavailable.is_none())
    }

    /// Apply a context's changes under `policy` and make them durable.
    ///
    /// Either every change lands or none does: on a merge conflict or a failed
    /// snapshot write the previous state stays in place.
    pub fn apply(&self, changes: &[Change], policy: MergePolicy) -> Result<CommitSummary> {
        let mut inner = self.inner.write()?;
        if let Some(reason) = &inner.unavailable {
            return Err(StoreError::Commit(format!(
                "Store '{}' is not open: {}",
                self.name, reason
            )));
        }

        let mut next = inner.state.clone();
        let mut summary = CommitSummary::default();

        for change in changes {
            let key = change.key();
            summary.entities.insert(change.entity().to_string());
            match change {
                Change::Upsert {
                    record,
                    changed,
                    base,
                } => match policy.merge_upsert(next.get(&key), record, changed, base.as_ref())? {
                    Some(merged) => {
                        next.put(merged);
                        summary.written.push(key);
                    }
                    None => summary.skipped.push(key),
                },
                Change::Delete { key } => {
                    if next.remove(key) {
                        summary.removed.push(key.clone());
                    } else {
                        summary.skipped.push(key.clone());
                    }
                }
            }
        }

        if let Some(persistence) = &self.persistence {
            if !summary.is_empty() {
                let snapshot = StoreSnapshot::new(&self.name, inner.schema_version, &next);
                persistence.save(&snapshot)?;
            }
        }

        inner.state = next;
        Ok(summary)
    }
}
