use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Store open error: {0}")]
    StoreOpen(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Commit error: {0}")]
    Commit(String),

    #[error("Merge conflict on {entity} '{id}': fields {fields:?}")]
    MergeConflict {
        entity: String,
        id: String,
        fields: Vec<String>,
    },

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Write queue is closed")]
    QueueClosed,

    #[error("Write aborted: {0}")]
    WriteAborted(String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Mapping(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_conflict_display() {
        let err = StoreError::MergeConflict {
            entity: "task".to_string(),
            id: "1".to_string(),
            fields: vec!["title".to_string()],
        };
        assert_eq!(err.to_string(), "Merge conflict on task '1': fields [\"title\"]");
    }

    #[test]
    fn test_poison_error_maps_to_lock_error() {
        let lock = std::sync::Mutex::new(0);
        let _ = std::panic::catch_unwind(|| {
            let _guard = lock.lock().unwrap();
            panic!("poison");
        });
        let err: StoreError = lock.lock().unwrap_err().into();
        assert!(matches!(err, StoreError::LockError(_)));
    }
}
