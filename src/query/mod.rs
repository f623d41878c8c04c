pub mod composer;
pub mod pattern;
pub mod predicate;
pub mod sort;

pub use composer::{not_soft_deleted, visible};
pub use predicate::Predicate;
pub use sort::{SortDescriptor, sort_records};
