use super::Storage;
use crate::config::CommitFailurePolicy;
use crate::context::{ContextProvider, ContextScope, PersistenceContext};
use crate::core::{Result, StoreError};
use crate::mapping::{Entity, EntityMapper};
use crate::notify::ChangeNotifier;
use crate::store::{CommitSummary, PersistedRecord};
use tracing::{debug, warn};

impl<T: Entity, M: EntityMapper<T>> Storage<T, M> {
    /// Queue `mutation`, then commit its context and the main context and
    /// publish a change for every entity the commit touched.
    ///
    /// Commit and publish both happen inside the queued job, so dropping the
    /// returned future after the job was queued still commits and notifies.
    ///
    /// An error from `mutation` itself discards the staged changes and is
    /// returned as is. A commit failure goes to the error sink; what the
    /// caller sees then depends on the store's [`CommitFailurePolicy`]. The
    /// in-memory value is never rolled back.
    pub async fn execute_mutate_and_persist<R, F>(&self, mutation: F) -> Result<R>
    where
        F: FnOnce(&M, &mut ContextScope<'_>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let provider = self.handle.provider().clone();
        let notifier = self.handle.notifier().clone();
        let mapper = self.mapper.clone();

        let (value, committed) = self
            .handle
            .queue()
            .enqueue(move |context| {
                let value = match context.perform_and_wait(|scope| mutation(&mapper, scope)) {
                    Ok(value) => value,
                    Err(err) => {
                        context.discard();
                        return Err(err);
                    }
                };
                let committed = persist(&provider, context);
                if let Ok(Some(summary)) = &committed {
                    publish(&notifier, summary);
                }
                Ok((value, committed))
            })
            .await??;

        match committed {
            Ok(_) => Ok(value),
            Err(err) => match self.handle.config().commit_failure {
                CommitFailurePolicy::Report => Ok(value),
                CommitFailurePolicy::Surface => Err(match err {
                    StoreError::Commit(_) => err,
                    other => StoreError::Commit(other.to_string()),
                }),
            },
        }
    }

    /// Upsert `entity`: live, unsynced, freshly dated
    pub async fn save(&self, entity: T) -> Result<T> {
        self.execute_mutate_and_persist(move |mapper, scope| {
            mapper.save_domain(&entity, scope)?;
            Ok(entity)
        })
        .await
    }

    pub async fn save_many(&self, entities: Vec<T>) -> Result<Vec<T>> {
        self.execute_mutate_and_persist(move |mapper, scope| {
            for entity in &entities {
                mapper.save_domain(entity, scope)?;
            }
            Ok(entities)
        })
        .await
    }

    /// Mark `entity` deleted but keep it for reconciliation. No-op if it was never saved.
    pub async fn soft_delete(&self, entity: T) -> Result<T> {
        self.execute_mutate_and_persist(move |mapper, scope| {
            soft_delete_one(mapper, &entity, scope)?;
            Ok(entity)
        })
        .await
    }

    pub async fn soft_delete_many(&self, entities: Vec<T>) -> Result<Vec<T>> {
        self.execute_mutate_and_persist(move |mapper, scope| {
            for entity in &entities {
                soft_delete_one(mapper, entity, scope)?;
            }
            Ok(entities)
        })
        .await
    }

    /// Remove `entity` permanently. No-op if it was never saved.
    pub async fn delete(&self, entity: T) -> Result<T> {
        self.execute_mutate_and_persist(move |mapper, scope| {
            delete_one(mapper, &entity, scope)?;
            Ok(entity)
        })
        .await
    }

    pub async fn delete_many(&self, entities: Vec<T>) -> Result<Vec<T>> {
        self.execute_mutate_and_persist(move |mapper, scope| {
            for entity in &entities {
                delete_one(mapper, entity, scope)?;
            }
            Ok(entities)
        })
        .await
    }

    /// Remove every record of `T`, soft-deleted ones included. Returns how many went.
    pub async fn delete_all(&self) -> Result<usize> {
        self.execute_mutate_and_persist(|mapper, scope| mapper.delete_all_entities(scope))
            .await
    }
}

fn persist(provider: &ContextProvider, context: &PersistenceContext) -> Result<Option<CommitSummary>> {
    match provider.commit(context) {
        Ok(summary) => {
            // the write is durable from here on; a main-context failure only
            // costs the main context its stale state
            if provider.commit_main().is_err() {
                let main = provider.main_context();
                warn!("main context {} could not follow commit of context {}", main.id(), context.id());
                main.discard();
                if let Err(err) = main.refresh() {
                    provider.error_sink().log_error(&err);
                }
            }
            Ok(summary)
        }
        Err(err) => {
            // fire-once: nothing is retried on a later commit
            context.discard();
            Err(err)
        }
    }
}

fn publish(notifier: &ChangeNotifier, summary: &CommitSummary) {
    if summary.is_empty() {
        return;
    }
    for entity in &summary.entities {
        notifier.publish(entity);
    }
}

fn soft_delete_one<T: Entity, M: EntityMapper<T>>(
    mapper: &M,
    entity: &T,
    scope: &mut ContextScope<'_>,
) -> Result<()> {
    match mapper.find_by_domain(entity, scope)? {
        Some(record) => {
            scope.update(&record.key(), PersistedRecord::mark_soft_deleted)?;
        }
        None => debug!("soft delete of unknown {} '{}' ignored", T::ENTITY_NAME, entity.id()),
    }
    Ok(())
}

fn delete_one<T: Entity, M: EntityMapper<T>>(
    mapper: &M,
    entity: &T,
    scope: &mut ContextScope<'_>,
) -> Result<()> {
    match mapper.find_by_domain(entity, scope)? {
        Some(record) => {
            mapper.delete(&record, scope)?;
        }
        None => debug!("delete of unknown {} '{}' ignored", T::ENTITY_NAME, entity.id()),
    }
    Ok(())
}
