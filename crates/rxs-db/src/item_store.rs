//! Item-level operations over a cell holding a [`Collection`].
//!
//! Every write is a whole-collection transform dispatched on the cell, so a
//! single item update and a bulk filter are equally atomic with respect to
//! the change feed. Results take the shape of the store's [`Mode`]: sync
//! stores hand back `Self` or the value, async stores a [`Deferred`] of it.
//!
//! [`Deferred`]: rxs_core::Deferred

use futures::future;
use futures::stream::{BoxStream, StreamExt};
use rxs_core::{CellConfig, Collection, Mode, StateFeed, Store, SyncMode};

/// A live query: re-evaluated on every snapshot until dropped or the store is
/// destroyed.
pub type LiveQuery<T> = BoxStream<'static, T>;

/// A collection of items inside a mutable cell of mode `M`.
pub struct ItemStore<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: Mode,
{
    cell: M::Cell<Collection<T>>,
}

impl<T, M> Clone for ItemStore<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: Mode,
{
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T, M> ItemStore<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: Mode,
{
    pub fn new(initial: impl Into<Collection<T>>) -> Self {
        Self::with_config(initial, CellConfig::default())
    }

    pub fn with_config(initial: impl Into<Collection<T>>, config: CellConfig) -> Self {
        Self {
            cell: <M::Cell<Collection<T>> as Store<Collection<T>>>::with_config(
                initial.into(),
                config,
            ),
        }
    }

    pub fn is_async(&self) -> bool {
        M::IS_ASYNC
    }

    /// The underlying cell.
    pub fn cell(&self) -> &M::Cell<Collection<T>> {
        &self.cell
    }

    fn settle(&self, dispatched: M::Out<M::Cell<Collection<T>>>) -> M::Out<Self> {
        let this = self.clone();
        M::map(dispatched, move |_| this)
    }

    /// Append `items` after the stored ones.
    pub fn extend(&self, items: Collection<T>) -> M::Out<Self> {
        self.settle(self.cell.dispatch(move |xs| xs.extend(&items)))
    }

    /// Apply `f` to every item.
    pub fn map<F>(&self, f: F) -> M::Out<Self>
    where
        F: FnMut(&T) -> T,
    {
        self.settle(self.cell.dispatch(move |xs| xs.map(f)))
    }

    /// Apply `f` to the items satisfying `p`; the rest pass through unchanged.
    pub fn predicate_map<F, P>(&self, mut f: F, mut p: P) -> M::Out<Self>
    where
        F: FnMut(&T) -> T,
        P: FnMut(&T) -> bool,
    {
        self.settle(self.cell.dispatch(move |xs| {
            xs.map(|item| if p(item) { f(item) } else { item.clone() })
        }))
    }

    /// Keep only the items satisfying `p`.
    pub fn filter<P>(&self, p: P) -> M::Out<Self>
    where
        P: FnMut(&T) -> bool,
    {
        self.settle(self.cell.dispatch(move |xs| xs.filter(p)))
    }

    /// The first item satisfying `p` in the latest snapshot.
    pub fn find<P>(&self, p: P) -> M::Out<Option<T>>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.cell.read(move |xs| xs.select(p).cloned())
    }

    /// Every item satisfying `p` in the latest snapshot, in order.
    pub fn find_many<P>(&self, p: P) -> M::Out<Vec<T>>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.cell
            .read(move |xs| xs.select_many(p).into_iter().cloned().collect())
    }

    /// The first match of every snapshot that has one.
    pub fn find_observable<P>(&self, mut p: P) -> LiveQuery<T>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.cell
            .state_feed()
            .filter_map(move |xs| future::ready(xs.select(&mut p).cloned()))
            .boxed()
    }

    /// The matches of every snapshot, including empty ones.
    pub fn find_observable_many<P>(&self, mut p: P) -> LiveQuery<Vec<T>>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.cell
            .state_feed()
            .map(move |xs| xs.select_many(&mut p).into_iter().cloned().collect())
            .boxed()
    }

    pub fn state_feed(&self) -> StateFeed<Collection<T>> {
        self.cell.state_feed()
    }

    pub fn destroy(&self) {
        self.cell.destroy();
    }

    pub fn is_destroyed(&self) -> bool {
        self.cell.is_destroyed()
    }
}

impl<T> ItemStore<T, SyncMode>
where
    T: Clone + Send + Sync + 'static,
{
    /// A copy of the current collection.
    pub fn snapshot(&self) -> Collection<T> {
        self.cell.state()
    }

    pub fn len(&self) -> usize {
        self.cell.read(Collection::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxs_core::AsyncMode;

    #[derive(Clone, Debug, PartialEq)]
    struct Item {
        id: u32,
        name: &'static str,
    }

    fn items() -> Vec<Item> {
        vec![
            Item { id: 1, name: "a" },
            Item { id: 2, name: "b" },
            Item { id: 3, name: "c" },
        ]
    }

    #[test]
    fn test_sync_extend_and_filter() {
        let store = ItemStore::<Item, SyncMode>::new(items());
        assert!(!store.is_async());

        store
            .extend(Collection::from(vec![Item { id: 4, name: "d" }]))
            .filter(|item| item.id % 2 == 0);

        let ids: Vec<u32> = store.snapshot().iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![2, 4]);
    }

    #[test]
    fn test_sync_predicate_map_leaves_others_untouched() {
        let store = ItemStore::<Item, SyncMode>::new(items());
        store.predicate_map(
            |item| Item {
                name: "z",
                ..item.clone()
            },
            |item| item.id == 2,
        );

        let names: Vec<&str> = store.snapshot().iter().map(|item| item.name).collect();
        assert_eq!(names, vec!["a", "z", "c"]);
    }

    #[test]
    fn test_sync_map_all() {
        let store = ItemStore::<Item, SyncMode>::new(items());
        store.map(|item| Item {
            id: item.id * 10,
            ..item.clone()
        });
        assert_eq!(store.find(|item| item.id == 30).map(|i| i.name), Some("c"));
    }

    #[test]
    fn test_sync_find_absent_and_many() {
        let store = ItemStore::<Item, SyncMode>::new(items());
        assert_eq!(store.find(|item| item.id == 9), None);
        assert_eq!(store.find_many(|item| item.id >= 2).len(), 2);
        assert!(store.find_many(|item| item.id > 10).is_empty());
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_async_find_resolves_latest_snapshot() {
        let store = ItemStore::<Item, AsyncMode>::new(items());
        assert!(store.is_async());

        let store = store.filter(|item| item.id != 1).await;
        assert_eq!(store.find(|item| item.id == 1).await, None);
        assert_eq!(
            store.find(|item| item.id == 2).await,
            Some(Item { id: 2, name: "b" })
        );
        assert_eq!(store.find_many(|_| true).await.len(), 2);
    }

    #[tokio::test]
    async fn test_find_observable_follows_updates() {
        let store = ItemStore::<Item, AsyncMode>::new(items());
        let mut live = store.find_observable(|item| item.name == "x");

        store
            .predicate_map(|item| Item { name: "x", ..item.clone() }, |item| item.id == 3)
            .await;
        store.destroy();

        assert_eq!(live.next().await, Some(Item { id: 3, name: "x" }));
        assert_eq!(live.next().await, None);
    }

    #[tokio::test]
    async fn test_find_observable_many_emits_every_snapshot() {
        let store = ItemStore::<Item, SyncMode>::new(items());
        let live = store.find_observable_many(|item| item.id > 1);

        store.filter(|item| item.id == 1);
        store.extend(Collection::from(vec![Item { id: 7, name: "g" }]));
        store.destroy();

        let counts: Vec<usize> = live.map(|found| found.len()).collect().await;
        assert_eq!(counts, vec![2, 0, 1]);
    }
}
