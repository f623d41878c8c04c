use super::Storage;
use crate::core::Result;
use crate::mapping::{Entity, EntityMapper};
use crate::query::{Predicate, SortDescriptor};
use crate::store::record::{FIELD_DATE_UPDATED, FIELD_SYNCED};
use crate::store::{PersistedRecord, RecordKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sync collaborator's acknowledgement of one pushed record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAck {
    pub id: String,
    /// `date_updated` of the version that was pushed
    pub date_updated: DateTime<Utc>,
}

impl SyncAck {
    pub fn for_record(record: &PersistedRecord) -> Self {
        Self {
            id: record.id.clone(),
            date_updated: record.date_updated,
        }
    }
}

impl<T: Entity, M: EntityMapper<T>> Storage<T, M> {
    /// Records a sync collaborator still has to push, oldest change first.
    /// Soft-deleted records are included.
    pub fn unsynced_records(&self) -> Result<Vec<PersistedRecord>> {
        self.execute_and_wait(|mapper, scope| {
            mapper.find_all(
                &Predicate::eq(FIELD_SYNCED, false),
                &[SortDescriptor::ascending(FIELD_DATE_UPDATED)],
                scope,
            )
        })
    }

    /// Set `synced` on every acknowledged record that has not changed since it
    /// was pushed. Returns how many records were marked.
    ///
    /// `date_updated` is left alone.
    pub async fn mark_synced(&self, acks: Vec<SyncAck>) -> Result<usize> {
        self.execute_mutate_and_persist(move |_mapper, scope| {
            let mut marked = 0;
            for ack in &acks {
                let key = RecordKey::new(T::ENTITY_NAME, ack.id.clone());
                let Some(record) = scope.fetch(&key)? else {
                    continue;
                };
                if record.synced || record.date_updated != ack.date_updated {
                    continue;
                }
                if scope.update(&key, |record| record.synced = true)?.is_some() {
                    marked += 1;
                }
            }
            Ok(marked)
        })
        .await
    }
}
