//! CRUD facade over an [`ItemStore`].
//!
//! A [`Database`] adds identifier assignment on insert and delegates every
//! notion of "same record" to its [`Strategies`]. Operations return
//! `Result<M::Out<_>>`: a missing strategy is an `Err` at call time, while
//! matching nothing is a normal `None` or empty `Vec`.
//!
//! Writes are whole-collection dispatches, so the value an operation returns
//! is captured while its transform runs. In async mode the returned handle
//! resolves once the written record can be read back from the store.

use crate::error::Result;
use crate::item_store::{ItemStore, LiveQuery};
use crate::observer::{ChangeObserver, Operation};
use crate::record::{default_id_generator, stamp_id, strip_id, IdGenerator, Record};
use crate::strategy::{DatabaseBuilder, EqualFn, FromUpdateFn, Strategies, ToSearchFn};
use rxs_core::{equal_to, Collection, Mode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// A record database of mode `M`.
///
/// `I`, `U`, `R` and `S` are the insert, update, remove and search payload
/// types; all default to the record type `T`.
pub struct Database<T, M, I = T, U = T, R = T, S = T>
where
    T: Record,
    M: Mode,
{
    store: ItemStore<T, M>,
    strategies: Strategies<T, U, R, S>,
    id_generator: IdGenerator,
    observer: Option<Arc<dyn ChangeObserver<T>>>,
    reporting: bool,
    _payloads: PhantomData<fn(I)>,
}

impl<T, M, I, U, R, S> Clone for Database<T, M, I, U, R, S>
where
    T: Record,
    M: Mode,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            strategies: self.strategies.clone(),
            id_generator: Arc::clone(&self.id_generator),
            observer: self.observer.clone(),
            reporting: self.reporting,
            _payloads: PhantomData,
        }
    }
}

impl<T, M, I, U, R, S> Database<T, M, I, U, R, S>
where
    T: Record,
    M: Mode,
{
    /// A database over `store` with no strategies configured.
    pub fn new(store: ItemStore<T, M>) -> Self {
        Self::from_parts(store, Strategies::default(), default_id_generator(), None, true)
    }

    pub fn builder() -> DatabaseBuilder<T, M, I, U, R, S> {
        DatabaseBuilder::new()
    }

    pub(crate) fn from_parts(
        store: ItemStore<T, M>,
        strategies: Strategies<T, U, R, S>,
        id_generator: IdGenerator,
        observer: Option<Arc<dyn ChangeObserver<T>>>,
        reporting: bool,
    ) -> Self {
        Self {
            store,
            strategies,
            id_generator,
            observer,
            reporting,
            _payloads: PhantomData,
        }
    }

    pub fn store(&self) -> &ItemStore<T, M> {
        &self.store
    }

    pub fn is_async(&self) -> bool {
        M::IS_ASYNC
    }

    /// Report completed mutations to `observer`, replacing any previous one.
    pub fn attach_observer(&mut self, observer: Arc<dyn ChangeObserver<T>>) {
        self.observer = Some(observer);
    }

    pub fn detach_observer(&mut self) -> Option<Arc<dyn ChangeObserver<T>>> {
        self.observer.take()
    }

    pub fn set_reporting(&mut self, enabled: bool) {
        self.reporting = enabled;
    }

    pub fn is_reporting(&self) -> bool {
        self.reporting && self.observer.is_some()
    }

    /// Append a complete record as is: no id assignment, no report.
    pub fn load(&self, item: T) -> M::Out<()> {
        M::map(self.store.extend(Collection::from(vec![item])), |_| ())
    }

    pub fn destroy(&self) {
        self.store.destroy();
    }

    fn next_id(&self) -> String {
        (self.id_generator)()
    }

    /// Hand a completed mutation to the observer.
    ///
    /// Runs when the operation is called, since the write has already landed
    /// by then; dropping an async handle does not lose the report.
    fn report(&self, operation: Operation, items: &[T]) {
        let Some(observer) = self.observer.as_ref().filter(|_| self.reporting) else {
            return;
        };
        if let Err(err) = observer.report(operation, items) {
            warn!(%operation, %err, "change observer rejected report");
        }
    }
}

impl<T, M, I, U, R, S> Database<T, M, I, U, R, S>
where
    T: Record,
    M: Mode,
    I: Serialize + DeserializeOwned + 'static,
    U: Serialize + 'static,
    R: 'static,
    S: Serialize + Send + 'static,
{
    /// Insert one record built from `payload`.
    ///
    /// The payload's own non-empty `id` is kept; otherwise a fresh one is
    /// generated.
    pub fn insert(&self, payload: I) -> Result<M::Out<T>> {
        let item: T = stamp_id(&payload, || self.next_id())?;
        let out = self.insert_kernel(item.clone());
        self.report(Operation::Insert, std::slice::from_ref(&item));
        Ok(out)
    }

    /// Insert every payload with a single append.
    pub fn insert_many(&self, payloads: impl IntoIterator<Item = I>) -> Result<M::Out<Vec<T>>> {
        let items = payloads
            .into_iter()
            .map(|payload| stamp_id(&payload, || self.next_id()))
            .collect::<Result<Vec<T>>>()?;
        debug!(count = items.len(), "inserting batch");

        let stored = self.store.extend(Collection::from(items.clone()));
        self.report(Operation::InsertMany, &items);
        let out = if M::IS_ASYNC {
            let ids: HashSet<String> = items
                .iter()
                .filter_map(|item| item.id().map(str::to_owned))
                .collect();
            M::and_then(stored, move |store| {
                store.find_many(move |x: &T| x.id().is_some_and(|id| ids.contains(id)))
            })
        } else {
            M::map(stored, move |_| items)
        };
        Ok(out)
    }

    /// Remove the records matching `payload` under `remove_equal`.
    ///
    /// Returns the removed record as it was before removal.
    pub fn remove(&self, payload: R) -> Result<M::Out<Option<T>>> {
        let remove_equal = self.strategies.remove_equal()?;
        let mut removed = None;
        let stored = self.store.filter(|item| {
            if remove_equal(&payload, item) {
                removed = Some(item.clone());
                false
            } else {
                true
            }
        });
        let reported: Vec<T> = removed.iter().cloned().collect();
        self.report(Operation::Remove, &reported);
        Ok(M::map(stored, move |_| removed))
    }

    /// Remove every record matching any payload, in a single dispatch.
    ///
    /// The removed records come back in store order.
    pub fn remove_many(&self, payloads: impl IntoIterator<Item = R>) -> Result<M::Out<Vec<T>>> {
        let remove_equal = self.strategies.remove_equal()?;
        let payloads: Vec<R> = payloads.into_iter().collect();
        let mut removed = Vec::new();
        let stored = self.store.filter(|item| {
            if payloads.iter().any(|payload| remove_equal(payload, item)) {
                removed.push(item.clone());
                false
            } else {
                true
            }
        });
        debug!(count = removed.len(), "removed batch");
        self.report(Operation::RemoveMany, &removed);
        Ok(M::map(stored, move |_| removed))
    }

    /// The first record whose search projection satisfies `predicate`.
    pub fn search<P>(&self, predicate: P) -> Result<M::Out<Option<T>>>
    where
        P: FnMut(&S) -> bool + Send + 'static,
    {
        let to_search = self.strategies.to_search()?;
        Ok(self.store.find(projected(to_search, predicate)))
    }

    /// Every record whose search projection satisfies `predicate`.
    pub fn search_many<P>(&self, predicate: P) -> Result<M::Out<Vec<T>>>
    where
        P: FnMut(&S) -> bool + Send + 'static,
    {
        let to_search = self.strategies.to_search()?;
        Ok(self.store.find_many(projected(to_search, predicate)))
    }

    /// [`search`](Self::search) for the first projection that structurally
    /// contains `payload`.
    pub fn search_equal_to(&self, payload: S) -> Result<M::Out<Option<T>>> {
        self.search(move |projection: &S| equal_to(&payload, projection))
    }

    pub fn find_observable<P>(&self, predicate: P) -> Result<LiveQuery<T>>
    where
        P: FnMut(&S) -> bool + Send + 'static,
    {
        let to_search = self.strategies.to_search()?;
        Ok(self.store.find_observable(projected(to_search, predicate)))
    }

    pub fn find_observable_many<P>(&self, predicate: P) -> Result<LiveQuery<Vec<T>>>
    where
        P: FnMut(&S) -> bool + Send + 'static,
    {
        let to_search = self.strategies.to_search()?;
        Ok(self.store.find_observable_many(projected(to_search, predicate)))
    }

    pub fn find_observable_equal_to(&self, payload: S) -> Result<LiveQuery<T>> {
        self.find_observable(move |projection: &S| equal_to(&payload, projection))
    }

    /// Replace the records matching `payload` with `from_update(payload, record)`.
    ///
    /// Non-matching records are left untouched in the same dispatch. Returns
    /// the merged record, or `None` when nothing matched.
    pub fn update(&self, payload: U) -> Result<M::Out<Option<T>>> {
        let (update_equal, from_update) = self.strategies.for_update()?;
        let (merged, out) = self.update_kernel(&payload, &update_equal, &from_update);
        let reported: Vec<T> = merged.into_iter().collect();
        self.report(Operation::Update, &reported);
        Ok(out)
    }

    /// [`update`](Self::update) per payload; unmatched payloads yield `None`
    /// in their slot.
    pub fn update_many(
        &self,
        payloads: impl IntoIterator<Item = U>,
    ) -> Result<M::Out<Vec<Option<T>>>> {
        let (update_equal, from_update) = self.strategies.for_update()?;
        let mut merged = Vec::new();
        let mut outs = Vec::new();
        for payload in payloads {
            let (item, out) = self.update_kernel(&payload, &update_equal, &from_update);
            merged.extend(item);
            outs.push(out);
        }
        self.report(Operation::UpdateMany, &merged);
        Ok(M::join_all(outs))
    }

    /// Update, or insert when nothing matched. Exactly one of the two happens.
    ///
    /// The inserted record is built from the payload without its `id`.
    pub fn upsert(&self, payload: U) -> Result<M::Out<T>> {
        let (update_equal, from_update) = self.strategies.for_update()?;
        let (item, out) = self.upsert_kernel(payload, &update_equal, &from_update)?;
        self.report(Operation::Upsert, std::slice::from_ref(&item));
        Ok(out)
    }

    /// [`upsert`](Self::upsert) per payload, results aligned with the input.
    pub fn upsert_many(&self, payloads: impl IntoIterator<Item = U>) -> Result<M::Out<Vec<T>>> {
        let (update_equal, from_update) = self.strategies.for_update()?;
        let (items, outs): (Vec<T>, Vec<M::Out<T>>) = payloads
            .into_iter()
            .map(|payload| self.upsert_kernel(payload, &update_equal, &from_update))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip();
        self.report(Operation::UpsertMany, &items);
        Ok(M::join_all(outs))
    }

    fn insert_kernel(&self, item: T) -> M::Out<T> {
        let stored = self.store.extend(Collection::from(vec![item.clone()]));
        if !M::IS_ASYNC {
            return M::map(stored, move |_| item);
        }
        M::and_then(stored, move |store| read_back(&store, item))
    }

    /// Returns the merged record as captured during the dispatch, alongside
    /// the mode-shaped result.
    fn update_kernel(
        &self,
        payload: &U,
        update_equal: &EqualFn<U, T>,
        from_update: &FromUpdateFn<U, T>,
    ) -> (Option<T>, M::Out<Option<T>>) {
        let mut merged: Option<T> = None;
        let stored = self.store.predicate_map(
            |item| {
                let next = from_update(payload, item);
                merged = Some(next.clone());
                next
            },
            |item| update_equal(payload, item),
        );

        let out = match merged.clone() {
            Some(item) if M::IS_ASYNC => {
                M::and_then(stored, move |store| M::map(read_back(&store, item), Some))
            }
            result => M::map(stored, move |_| result),
        };
        (merged, out)
    }

    /// Returns the stored record alongside the mode-shaped result.
    fn upsert_kernel(
        &self,
        payload: U,
        update_equal: &EqualFn<U, T>,
        from_update: &FromUpdateFn<U, T>,
    ) -> Result<(T, M::Out<T>)> {
        let (merged, updated) = self.update_kernel(&payload, update_equal, from_update);
        match merged {
            Some(merged) => {
                let fallback = merged.clone();
                Ok((merged, M::map(updated, move |found| found.unwrap_or(fallback))))
            }
            None => {
                let insert: I = strip_id(&payload)?;
                let item: T = stamp_id(&insert, || self.next_id())?;
                Ok((item.clone(), self.insert_kernel(item)))
            }
        }
    }
}

/// Look `item` up by id in the latest snapshot, falling back to `item`.
fn read_back<T, M>(store: &ItemStore<T, M>, item: T) -> M::Out<T>
where
    T: Record,
    M: Mode,
{
    match item.id().map(str::to_owned) {
        Some(id) => M::map(
            store.find(move |x: &T| x.id() == Some(id.as_str())),
            move |found| found.unwrap_or(item),
        ),
        None => M::ready(item),
    }
}

fn projected<T, S, P>(to_search: ToSearchFn<T, S>, mut predicate: P) -> impl FnMut(&T) -> bool + Send + 'static
where
    T: 'static,
    S: 'static,
    P: FnMut(&S) -> bool + Send + 'static,
{
    move |item: &T| predicate(&to_search(item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DbError, StrategyKind};
    use crate::observer::ReportResult;
    use rxs_core::{overlay, AsyncMode, SyncMode};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    type SyncDb = Database<Value, SyncMode>;
    type AsyncDb = Database<Value, AsyncMode>;

    fn seed() -> Vec<Value> {
        vec![
            json!({ "id": "111111", "name": "item1", "price": 10 }),
            json!({ "id": "222222", "name": "item2", "price": 100 }),
        ]
    }

    fn by_name(payload: &Value, item: &Value) -> bool {
        payload["name"] == item["name"]
    }

    fn configured<M: Mode>() -> Database<Value, M> {
        Database::builder()
            .items(seed())
            .update_equal(by_name)
            .remove_equal(by_name)
            .to_search(Value::clone)
            .from_update(|payload: &Value, item: &Value| overlay(payload, item))
            .id_generator(|| "generated".to_string())
            .build()
    }

    #[derive(Default)]
    struct Recorder {
        reports: Mutex<Vec<(Operation, usize)>>,
    }

    impl ChangeObserver<Value> for Recorder {
        fn report(&self, operation: Operation, items: &[Value]) -> ReportResult {
            self.reports
                .lock()
                .unwrap()
                .push((operation, items.len()));
            Ok(())
        }
    }

    #[test]
    fn test_update_merges_matching_item() {
        let db: SyncDb = configured();
        let merged = db.update(json!({ "name": "item2", "price": 1 })).unwrap();

        assert_eq!(merged, Some(json!({ "id": "222222", "name": "item2", "price": 1 })));
        assert_eq!(
            db.store().snapshot().into_vec(),
            vec![
                json!({ "id": "111111", "name": "item1", "price": 10 }),
                json!({ "id": "222222", "name": "item2", "price": 1 }),
            ]
        );
    }

    #[test]
    fn test_update_without_match_changes_nothing() {
        let db: SyncDb = configured();
        assert_eq!(db.update(json!({ "name": "nope", "price": 5 })).unwrap(), None);
        assert_eq!(db.store().snapshot().into_vec(), seed());
    }

    #[test]
    fn test_remove_returns_pre_removal_record() {
        let db: SyncDb = configured();
        let removed = db.remove(json!({ "name": "item2" })).unwrap();

        assert_eq!(removed, Some(seed()[1].clone()));
        assert_eq!(db.store().snapshot().into_vec(), vec![seed()[0].clone()]);
    }

    #[test]
    fn test_insert_assigns_id() {
        let db: SyncDb = configured();
        let item = db.insert(json!({ "name": "item3", "price": 7 })).unwrap();

        assert_eq!(item, json!({ "id": "generated", "name": "item3", "price": 7 }));
        assert_eq!(db.store().len(), 3);
    }

    #[test]
    fn test_upsert_inserts_without_payload_id() {
        let db: SyncDb = configured();
        let item = db
            .upsert(json!({ "id": "999", "name": "item9", "price": 9 }))
            .unwrap();
        assert_eq!(item.id(), Some("generated"));
        assert_eq!(db.store().len(), 3);
    }

    #[test]
    fn test_missing_strategy_fails_fast() {
        let db: SyncDb = Database::new(ItemStore::new(seed()));

        assert_eq!(
            db.remove(json!({ "name": "item1" })).err(),
            Some(DbError::MissingStrategy(StrategyKind::RemoveEqual))
        );
        assert_eq!(
            db.update(json!({ "name": "item1" })).err(),
            Some(DbError::MissingStrategy(StrategyKind::UpdateEqual))
        );
        assert_eq!(
            db.search(|_| true).err(),
            Some(DbError::MissingStrategy(StrategyKind::ToSearch))
        );
        assert!(db.find_observable_many(|_| true).is_err());
        // Nothing was dispatched.
        assert_eq!(db.store().snapshot().into_vec(), seed());
    }

    #[test]
    fn test_load_skips_id_and_reporting() {
        let recorder = Arc::new(Recorder::default());
        let mut db: SyncDb = configured();
        db.attach_observer(recorder.clone());

        db.load(json!({ "name": "raw" }));
        assert_eq!(db.store().len(), 3);
        assert!(recorder.reports.lock().unwrap().is_empty());
    }

    #[test]
    fn test_observer_sees_each_mutation_once() {
        let recorder = Arc::new(Recorder::default());
        let mut db: SyncDb = configured();
        db.attach_observer(recorder.clone());
        assert!(db.is_reporting());

        db.insert(json!({ "name": "item3" })).unwrap();
        db.upsert(json!({ "name": "item4" })).unwrap();
        db.update(json!({ "name": "missing" })).unwrap();
        db.search_equal_to(json!({ "name": "item1" })).unwrap();

        assert_eq!(
            *recorder.reports.lock().unwrap(),
            vec![
                (Operation::Insert, 1),
                (Operation::Upsert, 1),
                (Operation::Update, 0),
            ]
        );

        db.set_reporting(false);
        db.remove(json!({ "name": "item1" })).unwrap();
        assert_eq!(recorder.reports.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_rejected_report_does_not_change_result() {
        struct Refuse;
        impl ChangeObserver<Value> for Refuse {
            fn report(&self, _: Operation, _: &[Value]) -> ReportResult {
                Err(crate::observer::ReportError("closed".into()))
            }
        }

        let mut db: SyncDb = configured();
        db.attach_observer(Arc::new(Refuse));
        let item = db.insert(json!({ "name": "item3" })).unwrap();
        assert_eq!(item["name"], "item3");
    }

    #[tokio::test]
    async fn test_async_insert_resolves_stored_item() {
        let db: AsyncDb = configured();
        let pending = db.insert(json!({ "name": "item3", "price": 3 })).unwrap();
        let item = pending.await;

        assert_eq!(item["id"], "generated");
        let found = db.search_equal_to(json!({ "name": "item3" })).unwrap().await;
        assert_eq!(found, Some(item));
    }

    #[tokio::test]
    async fn test_live_query_keeps_up_with_many_updates() {
        use futures::StreamExt;

        let db: SyncDb = configured();
        let live = db.find_observable(|_| true).unwrap();
        for price in 0..100 {
            db.update(json!({ "name": "item1", "price": price })).unwrap();
        }
        db.destroy();

        let seen: Vec<Value> = live.collect().await;
        assert_eq!(seen.len(), 101);
        assert_eq!(seen[100]["price"], 99);
    }

    #[tokio::test]
    async fn test_async_report_survives_dropped_handle() {
        let recorder = Arc::new(Recorder::default());
        let mut db: AsyncDb = configured();
        db.attach_observer(recorder.clone());

        drop(db.insert(json!({ "name": "x" })).unwrap());
        drop(db.update(json!({ "name": "item1", "price": 2 })).unwrap());
        drop(db.remove_many(vec![json!({ "name": "item2" })]).unwrap());

        assert_eq!(db.search_many(|_| true).unwrap().await.len(), 2);
        assert_eq!(
            *recorder.reports.lock().unwrap(),
            vec![
                (Operation::Insert, 1),
                (Operation::Update, 1),
                (Operation::RemoveMany, 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_async_update_and_remove() {
        let db: AsyncDb = configured();

        let merged = db
            .update(json!({ "name": "item1", "price": 11 }))
            .unwrap()
            .await;
        assert_eq!(merged.map(|item| item["price"].clone()), Some(json!(11)));

        let removed = db.remove(json!({ "name": "item1" })).unwrap().await;
        assert_eq!(removed.map(|item| item["id"].clone()), Some(json!("111111")));
        assert_eq!(db.search_many(|_| true).unwrap().await.len(), 1);
    }
}
