// ============================================================================
// Store Handle
// ============================================================================
//
// The handle is the one object an application constructs per store. It wires
// the context provider, the write queue and the change notifier together and
// is passed (cloned) to every `Storage`. There is no global store state.
//
// ============================================================================

use crate::config::StoreConfig;
use crate::context::ContextProvider;
use crate::core::{Result, StoreError};
use crate::notify::{BroadcastBus, ChangeNotifier, NotificationBus};
use crate::queue::WriteQueue;
use crate::sink::{ErrorSink, TracingErrorSink};
use crate::store::{Migrator, NoMigrations};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;

struct HandleInner {
    provider: Arc<ContextProvider>,
    queue: WriteQueue,
    notifier: ChangeNotifier,
}

#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<HandleInner>,
}

pub struct StoreHandleBuilder {
    config: StoreConfig,
    migrator: Arc<dyn Migrator>,
    error_sink: Arc<dyn ErrorSink>,
    bus: Option<Arc<dyn NotificationBus>>,
}

impl StoreHandleBuilder {
    pub fn migrator(mut self, migrator: Arc<dyn Migrator>) -> Self {
        self.migrator = migrator;
        self
    }

    pub fn error_sink(mut self, error_sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = error_sink;
        self
    }

    pub fn bus(mut self, bus: Arc<dyn NotificationBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Open the store and start its write queue.
    ///
    /// An invalid config is an error. A store that fails to load is not: it
    /// is reported to the error sink and the handle opens read-only (see
    /// [`StoreHandle::open_error`]). Durable stores must be opened inside a
    /// tokio runtime.
    pub fn open(self) -> Result<StoreHandle> {
        self.config.validate()?;

        let window = self.config.window();
        let provider = Arc::new(ContextProvider::open(
            self.config,
            self.migrator,
            self.error_sink,
        ));
        let runtime = Handle::try_current().ok();
        let queue = WriteQueue::start(provider.clone(), runtime.as_ref())?;
        let bus = self.bus.unwrap_or_else(|| Arc::new(BroadcastBus::new()));
        let notifier = ChangeNotifier::new(bus, window);

        Ok(StoreHandle {
            inner: Arc::new(HandleInner {
                provider,
                queue,
                notifier,
            }),
        })
    }
}

impl StoreHandle {
    pub fn builder(config: StoreConfig) -> StoreHandleBuilder {
        StoreHandleBuilder {
            config,
            migrator: Arc::new(NoMigrations),
            error_sink: Arc::new(TracingErrorSink),
            bus: None,
        }
    }

    /// Open with default collaborators
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::builder(config).open()
    }

    pub fn provider(&self) -> &Arc<ContextProvider> {
        &self.inner.provider
    }

    pub fn queue(&self) -> &WriteQueue {
        &self.inner.queue
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.inner.notifier
    }

    pub fn config(&self) -> &StoreConfig {
        self.inner.provider.config()
    }

    pub fn error_sink(&self) -> &Arc<dyn ErrorSink> {
        self.inner.provider.error_sink()
    }

    pub fn open_error(&self) -> Option<StoreError> {
        self.inner.provider.open_error()
    }

    pub fn reopen(&self) -> Result<()> {
        self.inner.provider.reopen()
    }

    /// Finish queued writes and stop the write queue.
    ///
    /// Reads keep working; later writes fail with `QueueClosed`.
    pub async fn close(&self) -> Result<()> {
        self.inner.queue.close().await?;
        info!("store '{}' closed", self.config().name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemoryErrorSink;

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = StoreHandle::open(StoreConfig::ephemeral(""));
        assert!(matches!(result, Err(StoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_ephemeral_opens_without_runtime() {
        let sink = Arc::new(MemoryErrorSink::new());
        let handle = StoreHandle::builder(StoreConfig::ephemeral("tasks"))
            .error_sink(sink.clone())
            .open()
            .unwrap();
        assert!(handle.queue().is_inline());
        assert!(handle.open_error().is_none());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_close_stops_writes() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let handle = StoreHandle::open(StoreConfig::durable("tasks", temp_dir.path())).unwrap();
        handle.close().await.unwrap();
        assert_eq!(
            handle.queue().enqueue(|_ctx| ()).await,
            Err(StoreError::QueueClosed)
        );
    }
}
