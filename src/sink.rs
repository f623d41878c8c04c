use crate::core::StoreError;
use std::sync::{Mutex, PoisonError};
use tracing::error;

/// Receives every failure the layer swallows instead of returning.
///
/// Called synchronously at the point of failure. Implementations must not panic.
pub trait ErrorSink: Send + Sync {
    fn log_error(&self, error: &StoreError);
}

/// Default sink: one `error!` event per failure
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn log_error(&self, err: &StoreError) {
        error!("store error: {}", err);
    }
}

/// Keeps every reported error in memory
#[derive(Debug, Default)]
pub struct MemoryErrorSink {
    errors: Mutex<Vec<StoreError>>,
}

impl MemoryErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<StoreError> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl ErrorSink for MemoryErrorSink {
    fn log_error(&self, err: &StoreError) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(err.clone());
    }
}
