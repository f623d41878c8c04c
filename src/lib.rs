// ============================================================================
// memostore Library
// ============================================================================

pub mod config;
pub mod context;
pub mod core;
pub mod handle;
pub mod logging;
pub mod mapping;
pub mod notify;
pub mod query;
pub mod queue;
pub mod sink;
pub mod storage;
pub mod store;

// Re-export main types for convenience
pub use config::{CommitFailurePolicy, StoreConfig, StoreKind};
pub use context::{Affinity, ContextProvider, ContextScope, MergePolicy, PersistenceContext};
pub use core::{Result, StoreError};
pub use handle::{StoreHandle, StoreHandleBuilder};
pub use mapping::{Entity, EntityMapper, JsonMapper};
pub use notify::{BroadcastBus, ChangeNotifier, NotificationBus};
pub use query::{Predicate, SortDescriptor};
pub use queue::{WriteQueue, WriteQueueStats};
pub use sink::{ErrorSink, MemoryErrorSink, TracingErrorSink};
pub use storage::{Storage, SyncAck};
pub use store::{
    MigrationPlan, MigrationStep, Migrator, NoMigrations, PersistedRecord, RecordKey,
    StoreContainer,
};
