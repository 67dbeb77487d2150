//! The replication target seam.

use crate::error::Result;
use crate::task::{Mark, MarkedTask};
use async_trait::async_trait;
use rxs_core::AsyncMode;
use rxs_db::{Database, Record};

/// A search predicate handed across the target boundary.
pub type Predicate<T> = Box<dyn FnMut(&T) -> bool + Send>;

/// Anything that can apply replicated operations.
///
/// Every operation resolves to the affected record, or `None` when nothing
/// matched.
#[async_trait]
pub trait ReplicaTarget<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn insert(&self, payload: T) -> Result<Option<T>>;

    async fn update(&self, payload: T) -> Result<Option<T>>;

    async fn upsert(&self, payload: T) -> Result<Option<T>>;

    async fn remove(&self, payload: T) -> Result<Option<T>>;

    async fn search(&self, predicate: Predicate<T>) -> Result<Option<T>>;

    async fn search_equal_to(&self, payload: T) -> Result<Option<T>>;

    /// Dispatch a task through the operation its mark names.
    async fn resolve(&self, task: MarkedTask<T>) -> Result<Option<T>> {
        let (mark, payload) = task.into_parts();
        match mark {
            Mark::Insert => self.insert(payload).await,
            Mark::Update => self.update(payload).await,
            Mark::Upsert => self.upsert(payload).await,
            Mark::Remove => self.remove(payload).await,
        }
    }
}

#[async_trait]
impl<T: Record> ReplicaTarget<T> for Database<T, AsyncMode> {
    async fn insert(&self, payload: T) -> Result<Option<T>> {
        let pending = Database::insert(self, payload)?;
        Ok(Some(pending.await))
    }

    async fn update(&self, payload: T) -> Result<Option<T>> {
        let pending = Database::update(self, payload)?;
        Ok(pending.await)
    }

    async fn upsert(&self, payload: T) -> Result<Option<T>> {
        let pending = Database::upsert(self, payload)?;
        Ok(Some(pending.await))
    }

    async fn remove(&self, payload: T) -> Result<Option<T>> {
        let pending = Database::remove(self, payload)?;
        Ok(pending.await)
    }

    async fn search(&self, predicate: Predicate<T>) -> Result<Option<T>> {
        let pending = Database::search(self, predicate)?;
        Ok(pending.await)
    }

    async fn search_equal_to(&self, payload: T) -> Result<Option<T>> {
        let pending = Database::search_equal_to(self, payload)?;
        Ok(pending.await)
    }
}
