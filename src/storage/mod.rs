//! Entity-typed storage API
//!
//! `Storage<T>` is the surface application code uses: synchronous reads,
//! queued mutations, reactive queries and the reconciliation helpers for a
//! sync collaborator. It holds no state of its own beyond the store handle,
//! the mapper and the read affinity, so clones are cheap.
//!
//! Every mutation is built from [`Storage::execute_mutate_and_persist`]:
//! queue, run against a private context, commit it, commit the main context,
//! notify.

mod mutations;
mod reactive;
mod reads;
mod reconcile;

pub use reconcile::SyncAck;

use crate::context::Affinity;
use crate::handle::StoreHandle;
use crate::mapping::{Entity, EntityMapper, JsonMapper};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub struct Storage<T: Entity, M: EntityMapper<T> = JsonMapper<T>> {
    handle: StoreHandle,
    mapper: Arc<M>,
    affinity: Affinity,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Storage<T, JsonMapper<T>>
where
    T: Entity + Serialize + DeserializeOwned,
{
    /// Storage mapping `T` through serde
    pub fn new(handle: &StoreHandle) -> Self {
        Self::with_mapper(handle, JsonMapper::new())
    }
}

impl<T: Entity, M: EntityMapper<T>> Storage<T, M> {
    pub fn with_mapper(handle: &StoreHandle, mapper: M) -> Self {
        Self {
            handle: handle.clone(),
            mapper: Arc::new(mapper),
            affinity: Affinity::default(),
            _entity: PhantomData,
        }
    }

    /// Same storage, reading through `affinity`
    pub fn on(&self, affinity: Affinity) -> Self {
        Self {
            affinity,
            ..self.clone()
        }
    }

    pub fn affinity(&self) -> Affinity {
        self.affinity
    }

    pub fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }
}

impl<T: Entity, M: EntityMapper<T>> Clone for Storage<T, M> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            mapper: self.mapper.clone(),
            affinity: self.affinity,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity, M: EntityMapper<T>> fmt::Debug for Storage<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("entity", &T::ENTITY_NAME)
            .field("store", &self.handle.config().name)
            .field("affinity", &self.affinity)
            .finish()
    }
}
