pub mod write_queue;

pub use write_queue::{WriteQueue, WriteQueueStats};
