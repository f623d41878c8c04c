// ============================================================================
// Context Provider
// ============================================================================
//
// Owns the object store, the main read context and the open/commit protocol.
//
// Opening never fails outright: a store that cannot be loaded is reported to
// the error sink and left empty and read-only, so read paths keep working and
// `reopen` can retry later.
//
// ============================================================================

use super::merge::MergePolicy;
use super::persistence_context::{ContextKind, PersistenceContext};
use crate::config::StoreConfig;
use crate::core::{Result, StoreError};
use crate::sink::ErrorSink;
use crate::store::{
    CommitSummary, Migrator, ObjectStore, SnapshotManager, StoreContainer, StoreSnapshot,
    StoreState,
};
use std::num::NonZeroUsize;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, info_span, warn};

pub struct ContextProvider {
    config: StoreConfig,
    store: Arc<ObjectStore>,
    main: PersistenceContext,
    migrator: Arc<dyn Migrator>,
    error_sink: Arc<dyn ErrorSink>,
    open_error: RwLock<Option<StoreError>>,
}

impl ContextProvider {
    /// Build the store and load it.
    ///
    /// Load failures are reported, not returned; check [`open_error`](Self::open_error).
    pub fn open(
        config: StoreConfig,
        migrator: Arc<dyn Migrator>,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Self {
        let persistence = config.snapshot_path().map(SnapshotManager::new);
        let store = Arc::new(ObjectStore::new(config.name.clone(), persistence));
        let capacity = NonZeroUsize::new(config.main_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        let main = PersistenceContext::new(
            ContextKind::Main,
            store.clone(),
            config.merge_policy,
            Some(capacity),
        );

        let provider = Self {
            config,
            store,
            main,
            migrator,
            error_sink,
            open_error: RwLock::new(None),
        };

        match provider.load() {
            Ok(()) => info!(
                "opened store '{}' ({})",
                provider.config.name,
                if provider.is_inline() { "ephemeral" } else { "durable" }
            ),
            Err(err) => provider.fail_open(err),
        }
        provider
    }

    fn load(&self) -> Result<()> {
        self.config.validate()?;

        let document = match self.store.persistence() {
            Some(persistence) => persistence.load_document()?,
            None => None,
        };
        let container = StoreContainer::new(self.config.name.clone(), document);
        let found_version = container.schema_version;
        let container = self.migrator.perform_migrations(container)?;

        let state = match container.document {
            Some(document) => StoreSnapshot::from_document(document)?.into_state(),
            None => StoreState::default(),
        };

        if container.schema_version != found_version {
            info!(
                "store '{}' migrated from schema {} to {}",
                self.config.name, found_version, container.schema_version
            );
            if let Some(persistence) = self.store.persistence() {
                if persistence.exists() {
                    persistence.save(&StoreSnapshot::new(
                        &self.config.name,
                        container.schema_version,
                        &state,
                    ))?;
                }
            }
        }

        debug!(
            "store '{}' loaded {} record(s) at schema {}",
            self.config.name,
            state.record_count(),
            container.schema_version
        );
        self.store.install(state, container.schema_version)
    }

    fn fail_open(&self, err: StoreError) {
        let err = match err {
            StoreError::StoreOpen(_) | StoreError::Migration(_) => err,
            other => StoreError::StoreOpen(other.to_string()),
        };
        warn!("store '{}' failed to open: {}", self.config.name, err);
        self.error_sink.log_error(&err);
        if let Err(mark_err) = self.store.mark_unavailable(err.to_string()) {
            self.error_sink.log_error(&mark_err);
        }
        *self.open_error.write().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    /// Retry a failed open. A store that is already open is left alone.
    pub fn reopen(&self) -> Result<()> {
        if self.store.is_available()? {
            return Ok(());
        }

        match self.load() {
            Ok(()) => {
                *self.open_error.write()? = None;
                self.main.discard();
                self.main.refresh()?;
                info!("store '{}' reopened", self.config.name);
                Ok(())
            }
            Err(err) => {
                self.fail_open(err);
                Err(self.open_error().unwrap_or(StoreError::StoreOpen(
                    "Store failed to reopen".to_string(),
                )))
            }
        }
    }

    /// Last open failure, cleared by a successful `reopen`
    pub fn open_error(&self) -> Option<StoreError> {
        self.open_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The shared read context. Only this layer commits it.
    pub fn main_context(&self) -> &PersistenceContext {
        &self.main
    }

    /// A fresh context for one operation.
    ///
    /// Ephemeral stores hand out the main context instead.
    pub fn new_background_context(&self) -> PersistenceContext {
        if self.is_inline() {
            return self.main.clone();
        }
        PersistenceContext::new(
            ContextKind::Background,
            self.store.clone(),
            self.config.merge_policy,
            None,
        )
    }

    /// Flush a context's pending changes.
    ///
    /// Returns `Ok(None)` when there was nothing to write. Failures are
    /// reported to the error sink before being returned; the store keeps its
    /// previous state.
    pub fn commit(&self, context: &PersistenceContext) -> Result<Option<CommitSummary>> {
        let span = info_span!("commit", store = %self.config.name, context = context.id());
        let _enter = span.enter();

        match context.commit_pending() {
            Ok(Some(summary)) => {
                debug!(
                    "context {} committed: {} written, {} removed, {} skipped",
                    context.id(),
                    summary.written.len(),
                    summary.removed.len(),
                    summary.skipped.len()
                );
                Ok(Some(summary))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                warn!("commit of context {} failed: {}", context.id(), err);
                self.error_sink.log_error(&err);
                Err(err)
            }
        }
    }

    /// Commit the main context, then resync its registered records with the store
    pub fn commit_main(&self) -> Result<Option<CommitSummary>> {
        let summary = self.commit(&self.main)?;
        if let Err(err) = self.main.refresh() {
            self.error_sink.log_error(&err);
            return Err(err);
        }
        Ok(summary)
    }

    /// Ephemeral stores run mutations inline on the main context
    pub fn is_inline(&self) -> bool {
        self.config.is_ephemeral()
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.config.merge_policy
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    pub fn error_sink(&self) -> &Arc<dyn ErrorSink> {
        &self.error_sink
    }
}
