#![allow(dead_code)]

use memostore::{Entity, MemoryErrorSink, StoreConfig, StoreHandle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub soft_deleted: bool,
}

impl Task {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            priority: 0,
            soft_deleted: false,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

impl Entity for Task {
    const ENTITY_NAME: &'static str = "task";

    fn id(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub id: String,
    pub count: i64,
}

impl Entity for Counter {
    const ENTITY_NAME: &'static str = "counter";

    fn id(&self) -> String {
        self.id.clone()
    }
}

pub fn open(config: StoreConfig) -> (StoreHandle, Arc<MemoryErrorSink>) {
    memostore::logging::init_test_logging();
    let sink = Arc::new(MemoryErrorSink::new());
    let handle = StoreHandle::builder(config)
        .error_sink(sink.clone())
        .open()
        .unwrap();
    (handle, sink)
}

pub fn ephemeral() -> (StoreHandle, Arc<MemoryErrorSink>) {
    open(StoreConfig::ephemeral("tasks"))
}

/// Must be called inside a tokio runtime
pub fn durable(dir: &Path) -> (StoreHandle, Arc<MemoryErrorSink>) {
    open(StoreConfig::durable("tasks", dir))
}
