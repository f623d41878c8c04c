pub mod merge;
pub mod persistence_context;
pub mod provider;

pub use merge::MergePolicy;
pub use persistence_context::{ContextKind, ContextScope, PersistenceContext};
pub use provider::ContextProvider;

/// Which context a read runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Affinity {
    /// The shared main context; sees committed state after each write lands
    #[default]
    Main,
    /// A fresh context per call, read straight from the store
    Background,
}
