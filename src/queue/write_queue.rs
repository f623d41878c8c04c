// ============================================================================
// Write Queue
// ============================================================================
//
// Every mutation goes through here. One worker task takes jobs in FIFO order
// and runs each one to completion on the blocking pool before it looks at the
// next, so at most one mutation touches the store at a time. Each job gets a
// brand new background context.
//
// Ephemeral stores have no worker: the mutation runs inline on the caller,
// behind a gate that keeps the single-writer guarantee.
//
// ============================================================================

use crate::context::{ContextProvider, PersistenceContext};
use crate::core::{Result, StoreError};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Counters since the queue was started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteQueueStats {
    pub enqueued: u64,
    pub completed: u64,
    pub aborted: u64,
}

impl WriteQueueStats {
    /// Jobs accepted but not finished yet
    pub fn pending(&self) -> u64 {
        self.enqueued.saturating_sub(self.completed + self.aborted)
    }
}

#[derive(Default)]
struct QueueCounters {
    enqueued: AtomicU64,
    completed: AtomicU64,
    aborted: AtomicU64,
}

enum QueueMode {
    Worker {
        sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
        join_handle: Mutex<Option<JoinHandle<()>>>,
    },
    Inline {
        gate: Mutex<()>,
        closed: AtomicBool,
    },
}

struct QueueInner {
    provider: Arc<ContextProvider>,
    mode: QueueMode,
    counters: Arc<QueueCounters>,
}

/// Single-concurrency executor for mutations. Clones share one queue.
#[derive(Clone)]
pub struct WriteQueue {
    inner: Arc<QueueInner>,
}

impl WriteQueue {
    /// Start a queue for `provider`.
    ///
    /// Durable stores spawn the worker on `runtime`. Ephemeral stores run
    /// inline and need no runtime.
    pub fn start(provider: Arc<ContextProvider>, runtime: Option<&Handle>) -> Result<Self> {
        let counters = Arc::new(QueueCounters::default());

        let mode = if provider.is_inline() {
            QueueMode::Inline {
                gate: Mutex::new(()),
                closed: AtomicBool::new(false),
            }
        } else {
            let runtime = runtime.ok_or_else(|| {
                StoreError::InvalidConfig(format!(
                    "Store '{}' is durable and needs a tokio runtime for its write queue",
                    provider.config().name
                ))
            })?;
            let (sender, receiver) = mpsc::unbounded_channel::<Job>();
            let join_handle = runtime.spawn(run_worker(
                provider.config().name.clone(),
                receiver,
                counters.clone(),
            ));
            QueueMode::Worker {
                sender: Mutex::new(Some(sender)),
                join_handle: Mutex::new(Some(join_handle)),
            }
        };

        Ok(Self {
            inner: Arc::new(QueueInner {
                provider,
                mode,
                counters,
            }),
        })
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.inner.mode, QueueMode::Inline { .. })
    }

    /// Run `mutation` against a fresh background context once every earlier
    /// mutation has finished.
    ///
    /// Fails with `QueueClosed` after [`close`](Self::close) and with
    /// `WriteAborted` if the mutation panics.
    pub async fn enqueue<F, R>(&self, mutation: F) -> Result<R>
    where
        F: FnOnce(&PersistenceContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        match &self.inner.mode {
            QueueMode::Inline { gate, closed } => self.run_inline(gate, closed, mutation),
            QueueMode::Worker { sender, .. } => {
                let (result_tx, result_rx) = oneshot::channel();
                let provider = self.inner.provider.clone();
                let job: Job = Box::new(move || {
                    let context = provider.new_background_context();
                    let _ = result_tx.send(mutation(&context));
                });

                {
                    let guard = sender.lock()?;
                    let sender = guard.as_ref().ok_or(StoreError::QueueClosed)?;
                    sender.send(job).map_err(|_| StoreError::QueueClosed)?;
                    self.inner.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                }

                result_rx.await.map_err(|_| {
                    StoreError::WriteAborted("mutation panicked before returning".to_string())
                })
            }
        }
    }

    fn run_inline<F, R>(&self, gate: &Mutex<()>, closed: &AtomicBool, mutation: F) -> Result<R>
    where
        F: FnOnce(&PersistenceContext) -> R,
    {
        if closed.load(Ordering::Acquire) {
            return Err(StoreError::QueueClosed);
        }
        let _gate = gate.lock().unwrap_or_else(PoisonError::into_inner);
        let counters = &self.inner.counters;
        counters.enqueued.fetch_add(1, Ordering::Relaxed);

        let context = self.inner.provider.new_background_context();
        match catch_unwind(AssertUnwindSafe(|| mutation(&context))) {
            Ok(value) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(_) => {
                counters.aborted.fetch_add(1, Ordering::Relaxed);
                warn!("inline write on store '{}' panicked", self.inner.provider.config().name);
                Err(StoreError::WriteAborted(
                    "mutation panicked before returning".to_string(),
                ))
            }
        }
    }

    pub fn stats(&self) -> WriteQueueStats {
        let counters = &self.inner.counters;
        WriteQueueStats {
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            aborted: counters.aborted.load(Ordering::Relaxed),
        }
    }

    pub fn is_closed(&self) -> bool {
        match &self.inner.mode {
            QueueMode::Inline { closed, .. } => closed.load(Ordering::Acquire),
            QueueMode::Worker { sender, .. } => sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_none(),
        }
    }

    /// Stop accepting work, let queued mutations finish, then stop the worker.
    pub async fn close(&self) -> Result<()> {
        match &self.inner.mode {
            QueueMode::Inline { gate, closed } => {
                closed.store(true, Ordering::Release);
                // wait out a mutation that is running right now
                drop(gate.lock().unwrap_or_else(PoisonError::into_inner));
                Ok(())
            }
            QueueMode::Worker {
                sender,
                join_handle,
            } => {
                sender.lock()?.take();
                let join_handle = join_handle.lock()?.take();
                if let Some(join_handle) = join_handle {
                    join_handle.await.map_err(|err| {
                        StoreError::WriteAborted(format!("write queue worker join: {}", err))
                    })?;
                }
                Ok(())
            }
        }
    }
}

async fn run_worker(
    store: String,
    mut receiver: mpsc::UnboundedReceiver<Job>,
    counters: Arc<QueueCounters>,
) {
    debug!("write queue for store '{}' started", store);
    let mut sequence = 0u64;

    while let Some(job) = receiver.recv().await {
        sequence += 1;
        let span = info_span!("queued_write", store = %store, seq = sequence);
        let outcome = tokio::task::spawn_blocking(move || {
            let _enter = span.enter();
            job()
        })
        .await;

        match outcome {
            Ok(()) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                counters.aborted.fetch_add(1, Ordering::Relaxed);
                warn!("queued write {} on store '{}' aborted: {}", sequence, store, err);
            }
        }
    }

    debug!("write queue for store '{}' stopped after {} job(s)", store, sequence);
}
