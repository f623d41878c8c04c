use super::Storage;
use crate::context::{Affinity, ContextScope};
use crate::core::{Result, StoreError};
use crate::mapping::{Entity, EntityMapper};
use crate::query::{Predicate, SortDescriptor, visible};
use crate::store::PersistedRecord;

impl<T: Entity, M: EntityMapper<T>> Storage<T, M> {
    /// Run `work` synchronously against the context picked by this storage's
    /// affinity: the shared main context, or a fresh background context.
    pub fn execute_and_wait<R>(&self, work: impl FnOnce(&M, &mut ContextScope<'_>) -> R) -> R {
        let provider = self.handle.provider();
        match self.affinity {
            Affinity::Main => provider
                .main_context()
                .perform_and_wait(|scope| work(&self.mapper, scope)),
            Affinity::Background => provider
                .new_background_context()
                .perform_and_wait(|scope| work(&self.mapper, scope)),
        }
    }

    /// [`execute_and_wait`](Self::execute_and_wait) off the async executor.
    ///
    /// Ephemeral stores run it inline.
    pub async fn execute<R, F>(&self, work: F) -> Result<R>
    where
        F: FnOnce(&M, &mut ContextScope<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.off_executor(move |storage| Ok(storage.execute_and_wait(work)))
            .await
    }

    /// Run a blocking read on the blocking pool, or inline for ephemeral stores
    pub(super) async fn off_executor<R, F>(&self, read: F) -> Result<R>
    where
        F: FnOnce(&Self) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        if self.handle.provider().is_inline() {
            return read(self);
        }

        let storage = self.clone();
        tokio::task::spawn_blocking(move || read(&storage))
            .await
            .map_err(|err| StoreError::TaskFailed(format!("read on {}: {}", T::ENTITY_NAME, err)))?
    }

    /// Lookup by identifier. Soft-deleted records are returned as well.
    pub fn find_by_id(&self, id: &str) -> Result<Option<T>> {
        self.execute_and_wait(|mapper, scope| {
            mapper
                .find_by_id(id, scope)?
                .map(|record| mapper.to_domain(&record))
                .transpose()
        })
    }

    /// The persisted record behind `id`, bookkeeping included
    pub fn find_record_by_id(&self, id: &str) -> Result<Option<PersistedRecord>> {
        self.execute_and_wait(|mapper, scope| mapper.find_by_id(id, scope))
    }

    /// First live match in the default sort order
    pub fn find_first(&self, predicate: Option<Predicate>) -> Result<Option<T>> {
        let predicate = visible(predicate);
        self.execute_and_wait(|mapper, scope| {
            mapper
                .find_first(&predicate, scope)?
                .map(|record| mapper.to_domain(&record))
                .transpose()
        })
    }

    /// Every live match, sorted by `sort` or the entity's default sort
    pub fn find_all(
        &self,
        predicate: Option<Predicate>,
        sort: Option<Vec<SortDescriptor>>,
    ) -> Result<Vec<T>> {
        let predicate = visible(predicate);
        self.execute_and_wait(|mapper, scope| {
            let sort = sort.unwrap_or_else(|| mapper.default_sort());
            mapper
                .find_all(&predicate, &sort, scope)?
                .iter()
                .map(|record| mapper.to_domain(record))
                .collect()
        })
    }

    pub fn count(&self, predicate: Option<Predicate>) -> Result<usize> {
        let predicate = visible(predicate);
        self.execute_and_wait(|mapper, scope| Ok(mapper.find_all(&predicate, &[], scope)?.len()))
    }
}
