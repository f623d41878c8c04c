use super::Storage;
use crate::core::Result;
use crate::mapping::{Entity, EntityMapper};
use crate::query::{Predicate, SortDescriptor};
use futures::StreamExt;
use futures::stream::BoxStream;

// Each observer re-runs its query once per coalesced change signal. The
// subscription is taken when the method is called, so a write issued right
// after still produces a refresh.

impl<T: Entity, M: EntityMapper<T>> Storage<T, M> {
    /// [`find_by_id`](Self::find_by_id), re-run after every change to `T`
    pub fn observe_by_id(&self, id: &str) -> BoxStream<'static, Result<Option<T>>> {
        let storage = self.clone();
        let id = id.to_string();
        self.signals()
            .then(move |()| {
                let storage = storage.clone();
                let id = id.clone();
                async move { storage.off_executor(move |s| s.find_by_id(&id)).await }
            })
            .boxed()
    }

    /// [`find_first`](Self::find_first), re-run after every change to `T`
    pub fn observe_first(
        &self,
        predicate: Option<Predicate>,
    ) -> BoxStream<'static, Result<Option<T>>> {
        let storage = self.clone();
        self.signals()
            .then(move |()| {
                let storage = storage.clone();
                let predicate = predicate.clone();
                async move { storage.off_executor(move |s| s.find_first(predicate)).await }
            })
            .boxed()
    }

    /// [`find_all`](Self::find_all), re-run after every change to `T`
    pub fn observe_all(
        &self,
        predicate: Option<Predicate>,
        sort: Option<Vec<SortDescriptor>>,
    ) -> BoxStream<'static, Result<Vec<T>>> {
        let storage = self.clone();
        self.signals()
            .then(move |()| {
                let storage = storage.clone();
                let predicate = predicate.clone();
                let sort = sort.clone();
                async move { storage.off_executor(move |s| s.find_all(predicate, sort)).await }
            })
            .boxed()
    }

    fn signals(&self) -> BoxStream<'static, ()> {
        self.handle.notifier().subscribe(T::ENTITY_NAME)
    }
}
