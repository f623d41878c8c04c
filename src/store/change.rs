// ============================================================================
// Pending Change Tracking
// ============================================================================
//
// A context records what it wants to do to the store as a list of changes.
// Nothing reaches the store until the context is committed; discarding the
// context simply drops the list.
//
// ============================================================================

use super::record::{PersistedRecord, RecordKey};
use std::collections::BTreeSet;

/// One pending change held by a persistence context
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Insert or update a record.
    ///
    /// `changed` names the fields this context touched; `base` is the record
    /// as the context first saw it (`None` for a fresh insert). Merge policies
    /// compare `base` with the stored record to find conflicting fields.
    Upsert {
        record: PersistedRecord,
        changed: BTreeSet<String>,
        base: Option<PersistedRecord>,
    },

    /// Permanently remove a record
    Delete { key: RecordKey },
}

impl Change {
    pub fn key(&self) -> RecordKey {
        match self {
            Change::Upsert { record, .. } => record.key(),
            Change::Delete { key } => key.clone(),
        }
    }

    pub fn entity(&self) -> &str {
        match self {
            Change::Upsert { record, .. } => &record.entity,
            Change::Delete { key } => &key.entity,
        }
    }
}
