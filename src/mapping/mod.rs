//! Domain value <-> persisted record mapping
//!
//! [`Entity`] is the capability a domain type needs to be stored: a stable
//! entity name, an identifier and a default sort. [`EntityMapper`] converts
//! between the domain value and its [`PersistedRecord`] and knows how to find,
//! save and delete records inside a context. Only `to_domain` and `to_fields`
//! are required; the lookups have defaults built on the context scope.

use crate::context::ContextScope;
use crate::core::{Result, StoreError};
use crate::query::{Predicate, SortDescriptor};
use crate::store::record::{
    FIELD_DATE_UPDATED, FIELD_ID, FIELD_SOFT_DELETED, FIELD_SYNCED, format_timestamp,
    is_reserved_field,
};
use crate::store::{Fields, PersistedRecord, RecordKey};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

pub trait Entity: Clone + Send + Sync + 'static {
    /// Store-wide name of this entity type, also the notification key
    const ENTITY_NAME: &'static str;

    fn id(&self) -> String;

    /// Newest first unless the type says otherwise
    fn default_sort() -> Vec<SortDescriptor> {
        vec![SortDescriptor::descending(FIELD_DATE_UPDATED)]
    }

    fn record_key(&self) -> RecordKey {
        RecordKey::new(Self::ENTITY_NAME, self.id())
    }
}

pub trait EntityMapper<T: Entity>: Send + Sync + 'static {
    fn to_domain(&self, record: &PersistedRecord) -> Result<T>;

    /// Domain fields of `entity`, without the reserved bookkeeping names
    fn to_fields(&self, entity: &T) -> Result<Fields>;

    fn find_by_id(&self, id: &str, scope: &mut ContextScope<'_>) -> Result<Option<PersistedRecord>> {
        scope.fetch(&RecordKey::new(T::ENTITY_NAME, id))
    }

    fn find_first(
        &self,
        predicate: &Predicate,
        scope: &mut ContextScope<'_>,
    ) -> Result<Option<PersistedRecord>> {
        let sort = self.default_sort();
        Ok(scope.query(T::ENTITY_NAME, predicate, &sort)?.into_iter().next())
    }

    fn find_all(
        &self,
        predicate: &Predicate,
        sort: &[SortDescriptor],
        scope: &mut ContextScope<'_>,
    ) -> Result<Vec<PersistedRecord>> {
        scope.query(T::ENTITY_NAME, predicate, sort)
    }

    fn find_by_domain(&self, entity: &T, scope: &mut ContextScope<'_>) -> Result<Option<PersistedRecord>> {
        scope.fetch(&entity.record_key())
    }

    /// Upsert: update the existing record or stage a new one. Either way the
    /// record comes back live, unsynced and freshly dated.
    fn save_domain(&self, entity: &T, scope: &mut ContextScope<'_>) -> Result<PersistedRecord> {
        let key = entity.record_key();
        let fields = self.to_fields(entity)?;

        if scope.fetch(&key)?.is_some() {
            let updated = scope.update(&key, |record| {
                record.fields = fields.clone();
                record.mark_saved();
            })?;
            if let Some(record) = updated {
                return Ok(record);
            }
        }

        let mut record = PersistedRecord::new(T::ENTITY_NAME, key.id, fields);
        record.mark_saved();
        scope.insert(record.clone());
        Ok(record)
    }

    fn delete(&self, record: &PersistedRecord, scope: &mut ContextScope<'_>) -> Result<bool> {
        scope.delete(&record.key())
    }

    fn delete_all_entities(&self, scope: &mut ContextScope<'_>) -> Result<usize> {
        scope.delete_all(T::ENTITY_NAME)
    }

    fn default_sort(&self) -> Vec<SortDescriptor> {
        T::default_sort()
    }
}

/// Serde-driven mapper.
///
/// The entity must serialize to a JSON object. Reserved names are stripped
/// on the way in and filled from the record on the way out, so a domain
/// type may declare `id` (as a string), `synced`, `soft_deleted` or
/// `date_updated` to see the bookkeeping values.
pub struct JsonMapper<T> {
    _entity: PhantomData<fn() -> T>,
}

impl<T> JsonMapper<T> {
    pub fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }
}

impl<T> Default for JsonMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EntityMapper<T> for JsonMapper<T>
where
    T: Entity + Serialize + DeserializeOwned,
{
    fn to_domain(&self, record: &PersistedRecord) -> Result<T> {
        let mut object = record.fields.clone();
        object.insert(FIELD_ID.to_string(), Value::String(record.id.clone()));
        object.insert(FIELD_SYNCED.to_string(), Value::Bool(record.synced));
        object.insert(FIELD_SOFT_DELETED.to_string(), Value::Bool(record.soft_deleted));
        object.insert(
            FIELD_DATE_UPDATED.to_string(),
            Value::String(format_timestamp(&record.date_updated)),
        );
        serde_json::from_value(Value::Object(object)).map_err(|e| {
            StoreError::Mapping(format!("Cannot decode {} '{}': {}", T::ENTITY_NAME, record.id, e))
        })
    }

    fn to_fields(&self, entity: &T) -> Result<Fields> {
        match serde_json::to_value(entity)? {
            Value::Object(mut object) => {
                object.retain(|name, _| !is_reserved_field(name));
                Ok(object)
            }
            other => Err(StoreError::Mapping(format!(
                "{} must serialize to an object, got {}",
                T::ENTITY_NAME,
                other
            ))),
        }
    }
}
