pub mod change;
pub mod engine;
pub mod migration;
pub mod persistence;
pub mod record;

pub use change::Change;
pub use engine::{CommitSummary, EntityTable, ObjectStore, StoreState};
pub use migration::{MigrationPlan, MigrationStep, Migrator, NoMigrations, StoreContainer};
pub use persistence::{SnapshotManager, StoreSnapshot};
pub use record::{Fields, PersistedRecord, RecordKey};
