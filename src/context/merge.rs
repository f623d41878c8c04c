use crate::core::{Result, StoreError};
use crate::store::record::{FIELD_DATE_UPDATED, FIELD_SYNCED, PersistedRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Rule applied when a committing context changed a field that moved in the
/// store since the context first read the record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The committing context's value wins, field by field.
    #[default]
    PropertyTrump,
    /// The stored value wins for conflicting fields; other changes still apply.
    StoreTrump,
    /// Any conflicting field aborts the commit.
    Fail,
}

impl MergePolicy {
    /// Resolve one upsert against the currently stored record.
    ///
    /// Returns the record to write, or `None` when the change is dropped.
    /// `synced` and `date_updated` always come from the committing context.
    pub fn merge_upsert(
        &self,
        current: Option<&PersistedRecord>,
        record: &PersistedRecord,
        changed: &BTreeSet<String>,
        base: Option<&PersistedRecord>,
    ) -> Result<Option<PersistedRecord>> {
        let Some(current) = current else {
            if base.is_none() {
                let mut inserted = record.clone();
                inserted.version = 1;
                return Ok(Some(inserted));
            }

            // deleted underneath us
            return match self {
                MergePolicy::PropertyTrump => {
                    let mut inserted = record.clone();
                    inserted.version = record.version + 1;
                    Ok(Some(inserted))
                }
                MergePolicy::StoreTrump => Ok(None),
                MergePolicy::Fail => Err(conflict(record, changed.iter().cloned().collect())),
            };
        };

        let conflicts = conflicting_fields(current, changed, base);
        if *self == MergePolicy::Fail && !conflicts.is_empty() {
            return Err(conflict(record, conflicts));
        }

        let mut merged = current.clone();
        for name in changed {
            if *self == MergePolicy::StoreTrump && conflicts.contains(name) {
                continue;
            }
            merged.copy_field_from(record, name);
        }
        merged.version = current.version + 1;
        Ok(Some(merged))
    }
}

fn conflicting_fields(
    current: &PersistedRecord,
    changed: &BTreeSet<String>,
    base: Option<&PersistedRecord>,
) -> Vec<String> {
    changed
        .iter()
        .filter(|name| name.as_str() != FIELD_SYNCED && name.as_str() != FIELD_DATE_UPDATED)
        .filter(|name| base.and_then(|b| b.field(name)) != current.field(name))
        .cloned()
        .collect()
}

fn conflict(record: &PersistedRecord, fields: Vec<String>) -> StoreError {
    StoreError::MergeConflict {
        entity: record.entity.clone(),
        id: record.id.clone(),
        fields,
    }
}
