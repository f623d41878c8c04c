// ============================================================================
// Persistence Contexts
// ============================================================================
//
// A context is a unit of work against the object store. It keeps the records
// it has read (so repeated reads are stable until the context is refreshed)
// and the changes it wants to make. Nothing reaches the store until the
// provider commits the context.
//
// All work on a context runs through `perform_and_wait`, which holds the
// context's state lock for the duration of the closure. Callers therefore
// never need their own locking, and a context is never used by two threads at
// once.
//
// ============================================================================

use super::merge::MergePolicy;
use crate::core::Result;
use crate::query::{Predicate, SortDescriptor, sort_records};
use crate::store::{Change, CommitSummary, ObjectStore, PersistedRecord, RecordKey};
use lru::LruCache;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// The long-lived read context
    Main,
    /// Created for one operation, then dropped
    Background,
}

struct ContextState {
    pending: BTreeMap<RecordKey, Change>,
    registered: LruCache<RecordKey, PersistedRecord>,
}

impl ContextState {
    fn reset(&mut self) {
        self.pending.clear();
        self.registered.clear();
    }
}

struct ContextInner {
    id: u64,
    kind: ContextKind,
    store: Arc<ObjectStore>,
    merge_policy: MergePolicy,
    state: Mutex<ContextState>,
}

/// Handle to a persistence context. Clones share the same unit of work.
#[derive(Clone)]
pub struct PersistenceContext {
    inner: Arc<ContextInner>,
}

impl PersistenceContext {
    /// `capacity` bounds the registered-record cache; `None` means unbounded.
    pub(crate) fn new(
        kind: ContextKind,
        store: Arc<ObjectStore>,
        merge_policy: MergePolicy,
        capacity: Option<NonZeroUsize>,
    ) -> Self {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        let registered = match capacity {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        debug!("created {:?} context {} for store '{}'", kind, id, store.name());

        Self {
            inner: Arc::new(ContextInner {
                id,
                kind,
                store,
                merge_policy,
                state: Mutex::new(ContextState {
                    pending: BTreeMap::new(),
                    registered,
                }),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn kind(&self) -> ContextKind {
        self.inner.kind
    }

    pub fn is_main(&self) -> bool {
        self.inner.kind == ContextKind::Main
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.inner.merge_policy
    }

    /// Run `work` against this context and wait for it.
    ///
    /// Must not be called re-entrantly on the same context from inside `work`.
    pub fn perform_and_wait<R>(&self, work: impl FnOnce(&mut ContextScope<'_>) -> R) -> R {
        let mut scope = ContextScope {
            inner: &self.inner,
            state: self.lock_state(),
        };
        work(&mut scope)
    }

    pub fn has_changes(&self) -> bool {
        !self.lock_state().pending.is_empty()
    }

    /// Number of records with pending changes
    pub fn pending_len(&self) -> usize {
        self.lock_state().pending.len()
    }

    /// Drop every pending change
    pub fn discard(&self) {
        let mut state = self.lock_state();
        if !state.pending.is_empty() {
            debug!("context {} discarded {} pending change(s)", self.inner.id, state.pending.len());
            state.pending.clear();
        }
    }

    /// Push pending changes into the store.
    ///
    /// On failure the pending changes stay in place and the store is untouched.
    pub(crate) fn commit_pending(&self) -> Result<Option<CommitSummary>> {
        let mut state = self.lock_state();
        if state.pending.is_empty() {
            return Ok(None);
        }

        let changes: Vec<Change> = state.pending.values().cloned().collect();
        let summary = self.inner.store.apply(&changes, self.inner.merge_policy)?;
        state.pending.clear();

        for key in &summary.written {
            if let Some(record) = self.inner.store.get(key)? {
                state.registered.put(key.clone(), record);
            }
        }
        for key in summary.removed.iter().chain(&summary.skipped) {
            state.registered.pop(key);
        }
        Ok(Some(summary))
    }

    /// Bring registered records in line with the store
    pub(crate) fn refresh(&self) -> Result<()> {
        let snapshot = self.inner.store.state()?;
        let mut state = self.lock_state();
        let keys: Vec<RecordKey> = state.registered.iter().map(|(key, _)| key.clone()).collect();

        let mut refreshed = 0usize;
        for key in keys {
            match snapshot.get(&key) {
                None => {
                    state.registered.pop(&key);
                    refreshed += 1;
                }
                Some(fresh) => {
                    if let Some(slot) = state.registered.peek_mut(&key) {
                        if slot.version != fresh.version {
                            *slot = fresh.clone();
                            refreshed += 1;
                        }
                    }
                }
            }
        }
        if refreshed > 0 {
            debug!("context {} refreshed {} record(s)", self.inner.id, refreshed);
        }
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, ContextState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // a closure panicked mid-work; its changes are not trustworthy
                warn!("context {} recovered from a panic, dropping its state", self.inner.id);
                let mut guard = poisoned.into_inner();
                guard.reset();
                self.inner.state.clear_poison();
                guard
            }
        }
    }
}

impl fmt::Debug for PersistenceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceContext")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("store", &self.inner.store.name())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Context Scope
// ============================================================================

/// Exclusive access to a context for the duration of one `perform_and_wait`
pub struct ContextScope<'a> {
    inner: &'a ContextInner,
    state: MutexGuard<'a, ContextState>,
}

impl ContextScope<'_> {
    pub fn context_id(&self) -> u64 {
        self.inner.id
    }

    /// Record as this context sees it, pending changes included
    pub fn fetch(&mut self, key: &RecordKey) -> Result<Option<PersistedRecord>> {
        match self.state.pending.get(key) {
            Some(Change::Upsert { record, .. }) => return Ok(Some(record.clone())),
            Some(Change::Delete { .. }) => return Ok(None),
            None => {}
        }
        if let Some(record) = self.state.registered.get(key) {
            return Ok(Some(record.clone()));
        }

        let record = self.inner.store.get(key)?;
        if let Some(record) = &record {
            self.state.registered.put(key.clone(), record.clone());
        }
        Ok(record)
    }

    /// Every record of `entity` as this context sees it, ordered by id
    pub fn fetch_all(&mut self, entity: &str) -> Result<Vec<PersistedRecord>> {
        let mut merged: BTreeMap<String, PersistedRecord> = BTreeMap::new();
        for record in self.inner.store.records(entity)? {
            let key = record.key();
            let record = match self.state.registered.peek(&key) {
                Some(registered) => registered.clone(),
                None => record,
            };
            merged.insert(key.id, record);
        }

        for (key, change) in self.state.pending.iter() {
            if key.entity != entity {
                continue;
            }
            match change {
                Change::Upsert { record, .. } => {
                    merged.insert(key.id.clone(), record.clone());
                }
                Change::Delete { .. } => {
                    merged.remove(&key.id);
                }
            }
        }
        Ok(merged.into_values().collect())
    }

    /// Records of `entity` matching `predicate`, sorted
    pub fn query(
        &mut self,
        entity: &str,
        predicate: &Predicate,
        sort: &[SortDescriptor],
    ) -> Result<Vec<PersistedRecord>> {
        let mut matched = Vec::new();
        for record in self.fetch_all(entity)? {
            if predicate.evaluate(&record)? {
                matched.push(record);
            }
        }
        sort_records(&mut matched, sort);
        Ok(matched)
    }

    /// Stage a record that does not exist yet
    pub fn insert(&mut self, record: PersistedRecord) {
        let key = record.key();
        let base = match self.state.pending.remove(&key) {
            Some(Change::Upsert { base, .. }) => base,
            _ => None,
        };
        let changed: BTreeSet<String> = record.all_field_names().into_iter().collect();
        self.state
            .pending
            .insert(key, Change::Upsert { record, changed, base });
    }

    /// Apply `edit` to an existing record and stage the result.
    ///
    /// Returns `None` if the record does not exist in this context.
    pub fn update<F>(&mut self, key: &RecordKey, edit: F) -> Result<Option<PersistedRecord>>
    where
        F: FnOnce(&mut PersistedRecord),
    {
        let (previous, base, mut changed) = match self.state.pending.get(key) {
            Some(Change::Upsert {
                record,
                changed,
                base,
            }) => (record.clone(), base.clone(), changed.clone()),
            Some(Change::Delete { .. }) => return Ok(None),
            None => match self.fetch(key)? {
                Some(record) => (record.clone(), Some(record), BTreeSet::new()),
                None => return Ok(None),
            },
        };

        let mut next = previous.clone();
        edit(&mut next);
        next.entity = previous.entity.clone();
        next.id = previous.id.clone();

        changed.extend(next.changed_fields(&previous));
        if changed.is_empty() {
            return Ok(Some(next));
        }

        self.state.pending.insert(
            key.clone(),
            Change::Upsert {
                record: next.clone(),
                changed,
                base,
            },
        );
        Ok(Some(next))
    }

    /// Stage a permanent removal. Returns `false` if there was nothing to remove.
    pub fn delete(&mut self, key: &RecordKey) -> Result<bool> {
        if self.fetch(key)?.is_none() {
            return Ok(false);
        }

        // an insert that never reached the store just disappears
        if let Some(Change::Upsert { base: None, .. }) = self.state.pending.get(key) {
            if self.inner.store.get(key)?.is_none() {
                self.state.pending.remove(key);
                return Ok(true);
            }
        }

        self.state.registered.pop(key);
        self.state
            .pending
            .insert(key.clone(), Change::Delete { key: key.clone() });
        Ok(true)
    }

    /// Stage removal of every record of `entity`, soft-deleted ones included
    pub fn delete_all(&mut self, entity: &str) -> Result<usize> {
        let keys: Vec<RecordKey> = self.fetch_all(entity)?.iter().map(PersistedRecord::key).collect();
        let mut removed = 0;
        for key in &keys {
            if self.delete(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn has_changes(&self) -> bool {
        !self.state.pending.is_empty()
    }
}
