use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Domain fields of a persisted record.
pub type Fields = Map<String, Value>;

pub const FIELD_ID: &str = "id";
pub const FIELD_SYNCED: &str = "synced";
pub const FIELD_SOFT_DELETED: &str = "soft_deleted";
pub const FIELD_DATE_UPDATED: &str = "date_updated";

/// Field names owned by the store rather than by the domain value.
pub const RESERVED_FIELDS: [&str; 4] = [FIELD_ID, FIELD_SYNCED, FIELD_SOFT_DELETED, FIELD_DATE_UPDATED];

pub fn is_reserved_field(name: &str) -> bool {
    RESERVED_FIELDS.contains(&name)
}

/// Entity type plus domain identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub entity: String,
    pub id: String,
}

impl RecordKey {
    pub fn new(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity, self.id)
    }
}

/// On-disk representation of one domain entity.
///
/// `synced`, `soft_deleted` and `date_updated` are bookkeeping flags. Every
/// write path goes through [`PersistedRecord::mark_saved`] or
/// [`PersistedRecord::mark_soft_deleted`], both of which clear `synced` and
/// refresh `date_updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub object_id: Uuid,
    pub entity: String,
    pub id: String,
    pub version: u64,
    pub fields: Fields,
    pub synced: bool,
    pub soft_deleted: bool,
    pub date_updated: DateTime<Utc>,
}

impl PersistedRecord {
    pub fn new(entity: impl Into<String>, id: impl Into<String>, fields: Fields) -> Self {
        Self {
            object_id: Uuid::new_v4(),
            entity: entity.into(),
            id: id.into(),
            version: 0,
            fields,
            synced: false,
            soft_deleted: false,
            date_updated: Utc::now(),
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.entity.clone(), self.id.clone())
    }

    /// Read a field by name. Reserved names resolve to the bookkeeping columns.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            FIELD_ID => Some(Value::String(self.id.clone())),
            FIELD_SYNCED => Some(Value::Bool(self.synced)),
            FIELD_SOFT_DELETED => Some(Value::Bool(self.soft_deleted)),
            FIELD_DATE_UPDATED => Some(Value::String(format_timestamp(&self.date_updated))),
            _ => self.fields.get(name).cloned(),
        }
    }

    /// Copy one field (domain or bookkeeping) from `other`.
    ///
    /// A domain field missing in `other` is removed here as well. The id is never copied.
    pub fn copy_field_from(&mut self, other: &PersistedRecord, name: &str) {
        match name {
            FIELD_ID => {}
            FIELD_SYNCED => self.synced = other.synced,
            FIELD_SOFT_DELETED => self.soft_deleted = other.soft_deleted,
            FIELD_DATE_UPDATED => self.date_updated = other.date_updated,
            _ => match other.fields.get(name) {
                Some(value) => {
                    self.fields.insert(name.to_string(), value.clone());
                }
                None => {
                    self.fields.remove(name);
                }
            },
        }
    }

    /// Names of every field whose value differs between `self` and `other`.
    pub fn changed_fields(&self, other: &PersistedRecord) -> Vec<String> {
        let mut changed = Vec::new();
        if self.synced != other.synced {
            changed.push(FIELD_SYNCED.to_string());
        }
        if self.soft_deleted != other.soft_deleted {
            changed.push(FIELD_SOFT_DELETED.to_string());
        }
        if self.date_updated != other.date_updated {
            changed.push(FIELD_DATE_UPDATED.to_string());
        }
        for (name, value) in &self.fields {
            if other.fields.get(name) != Some(value) {
                changed.push(name.clone());
            }
        }
        for name in other.fields.keys() {
            if !self.fields.contains_key(name) {
                changed.push(name.clone());
            }
        }
        changed
    }

    /// Names of every field this record carries, bookkeeping included.
    pub fn all_field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = RESERVED_FIELDS[1..].iter().map(|s| s.to_string()).collect();
        names.extend(self.fields.keys().cloned());
        names
    }

    /// Bookkeeping for create/update: live again, unsynced, freshly dated.
    pub fn mark_saved(&mut self) {
        self.soft_deleted = false;
        self.touch();
    }

    /// Bookkeeping for a logical delete.
    pub fn mark_soft_deleted(&mut self) {
        self.soft_deleted = true;
        self.touch();
    }

    fn touch(&mut self) {
        self.synced = false;
        let now = Utc::now();
        // strictly increasing per record
        self.date_updated = if now > self.date_updated {
            now
        } else {
            self.date_updated + chrono::Duration::microseconds(1)
        };
    }
}

/// Fixed-width RFC 3339 so timestamps compare correctly as strings.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
