//! Queue-based replication from a sync primary to a replica target.
//!
//! The communicator keeps a queue of [`MarkedTask`]s and a feed carrying
//! queue snapshots. Whenever a non-empty snapshot is published and the
//! communicator is connected, the snapshot is drained against the target:
//! exactly that many entries are removed from the front of the live queue
//! before any task is dispatched, so tasks submitted during a drain wait for
//! the next one.

use crate::error::{RelayError, Result};
use crate::target::{Predicate, ReplicaTarget};
use crate::task::{Mark, MarkedTask};
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use rxs_core::{overlay_as, AsyncMode, SyncMode};
use rxs_db::{
    ChangeObserver, Database, EqualFn, FromUpdateFn, ItemStore, Operation, Record, ReportError,
    ReportResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, trace, warn};

/// Configuration for a communicator.
#[derive(Clone, Debug)]
pub struct CommunicatorConfig {
    /// Period of the interval watch (in milliseconds).
    pub watch_interval_ms: u64,
    /// Start the interval watch from [`Communicator::connect`].
    pub autostart_watch: bool,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            watch_interval_ms: 1000,
            autostart_watch: false,
        }
    }
}

/// Builder for communicator configuration.
pub struct CommunicatorConfigBuilder {
    config: CommunicatorConfig,
}

impl CommunicatorConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CommunicatorConfig::default(),
        }
    }

    pub fn watch_interval(mut self, ms: u64) -> Self {
        self.config.watch_interval_ms = ms;
        self
    }

    pub fn autostart_watch(mut self, enabled: bool) -> Self {
        self.config.autostart_watch = enabled;
        self
    }

    pub fn build(self) -> CommunicatorConfig {
        self.config
    }
}

impl Default for CommunicatorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one drain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Tasks dispatched to the target.
    pub dispatched: usize,
    /// Tasks the target failed to apply.
    pub failed: usize,
}

impl DrainReport {
    pub fn succeeded(&self) -> usize {
        self.dispatched - self.failed
    }
}

/// How [`Communicator::preload`] picks the record to pull.
pub enum Matcher<T> {
    /// The first record satisfying the predicate.
    Predicate(Predicate<T>),
    /// The first record structurally containing this value.
    EqualTo(T),
}

struct Shared<T, D>
where
    T: Record,
{
    primary: ItemStore<T, SyncMode>,
    target: Arc<D>,
    queue: Mutex<Vec<MarkedTask<T>>>,
    /// `None` once destroyed, which completes every feed subscription.
    feed: Mutex<Option<watch::Sender<Vec<MarkedTask<T>>>>>,
    /// Keeps the last published snapshot readable after the feed completes.
    last_published: watch::Receiver<Vec<MarkedTask<T>>>,
    shutdown: watch::Sender<bool>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    config: CommunicatorConfig,
}

impl<T, D> Shared<T, D>
where
    T: Record,
    D: ReplicaTarget<T>,
{
    fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn publish(&self) {
        let queue = self.queue.lock();
        match self.feed.lock().as_ref() {
            Some(feed) => {
                feed.send_replace(queue.clone());
                trace!(pending = queue.len(), "published queue");
            }
            None => trace!("queue feed completed, publish ignored"),
        }
    }

    fn push(&self, snapshot: Vec<MarkedTask<T>>) {
        let _queue = self.queue.lock();
        if let Some(feed) = self.feed.lock().as_ref() {
            feed.send_replace(snapshot);
        }
    }

    /// A receiver of the queue feed. Already completed after destroy.
    fn subscribe(&self) -> watch::Receiver<Vec<MarkedTask<T>>> {
        match self.feed.lock().as_ref() {
            Some(feed) => feed.subscribe(),
            None => self.last_published.clone(),
        }
    }

    /// Empty the live queue and retract any snapshot the watcher has not
    /// drained yet, so no task is dispatched twice.
    fn take_all(&self) -> Vec<MarkedTask<T>> {
        let mut queue = self.queue.lock();
        if let Some(feed) = self.feed.lock().as_ref() {
            feed.send_if_modified(|published| {
                let stale = !published.is_empty();
                published.clear();
                stale
            });
        }
        std::mem::take(&mut *queue)
    }

    /// Remove `count` entries from the front of the live queue.
    fn dequeue(&self, count: usize) {
        let mut queue = self.queue.lock();
        let count = count.min(queue.len());
        queue.drain(..count);
        debug!(count, remaining = queue.len(), "dequeued tasks");
    }

    /// Take the latest published snapshot and dequeue it in one step.
    fn take_published(&self, feed: &mut watch::Receiver<Vec<MarkedTask<T>>>) -> Vec<MarkedTask<T>> {
        let mut queue = self.queue.lock();
        let tasks = feed.borrow_and_update().clone();
        let count = tasks.len().min(queue.len());
        queue.drain(..count);
        tasks
    }

    fn dispatch(&self, tasks: Vec<MarkedTask<T>>) -> BoxFuture<'static, DrainReport> {
        let target = Arc::clone(&self.target);
        async move {
            let dispatched = tasks.len();
            let results = future::join_all(tasks.into_iter().map(|task| {
                let target = Arc::clone(&target);
                async move {
                    let mark = task.mark;
                    (mark, target.resolve(task).await)
                }
            }))
            .await;

            let mut failed = 0;
            for (mark, result) in results {
                if let Err(err) = result {
                    failed += 1;
                    warn!(%mark, %err, "replication task failed");
                }
            }
            debug!(dispatched, failed, "drain finished");
            DrainReport { dispatched, failed }
        }
        .boxed()
    }
}

/// Replicates queued mutations from a sync primary into a replica target.
pub struct Communicator<T, D = Database<T, AsyncMode>>
where
    T: Record,
    D: ReplicaTarget<T>,
{
    shared: Arc<Shared<T, D>>,
}

impl<T, D> Clone for Communicator<T, D>
where
    T: Record,
    D: ReplicaTarget<T>,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, D> Communicator<T, D>
where
    T: Record,
    D: ReplicaTarget<T>,
{
    pub fn new(primary: ItemStore<T, SyncMode>, target: Arc<D>) -> Self {
        Self::with_config(primary, target, CommunicatorConfig::default())
    }

    pub fn with_config(
        primary: ItemStore<T, SyncMode>,
        target: Arc<D>,
        config: CommunicatorConfig,
    ) -> Self {
        let (feed, last_published) = watch::channel(Vec::new());
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                primary,
                target,
                queue: Mutex::new(Vec::new()),
                feed: Mutex::new(Some(feed)),
                last_published,
                shutdown,
                watcher: Mutex::new(None),
                config,
            }),
        }
    }

    pub fn config(&self) -> &CommunicatorConfig {
        &self.shared.config
    }

    pub fn target(&self) -> &Arc<D> {
        &self.shared.target
    }

    /// This communicator as a database change observer.
    pub fn observer(&self) -> Arc<dyn ChangeObserver<T>> {
        Arc::new(self.clone())
    }

    /// Append a task to the queue.
    pub fn submit(&self, task: MarkedTask<T>) -> Result<()> {
        if self.shared.is_closed() {
            return Err(RelayError::Closed);
        }
        let mut queue = self.shared.queue.lock();
        trace!(mark = %task.mark, pending = queue.len() + 1, "task submitted");
        queue.push(task);
        Ok(())
    }

    /// A copy of the queued tasks, oldest first.
    pub fn pending(&self) -> Vec<MarkedTask<T>> {
        self.shared.queue.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Start draining on every non-empty published snapshot.
    ///
    /// Spawns the watcher on the current tokio runtime. Calling it again
    /// while connected only returns another feed handle. Tasks already
    /// queued are published straight away.
    pub fn connect(&self) -> QueueFeed<T, D> {
        let feed = QueueFeed {
            shared: Arc::clone(&self.shared),
        };

        if self.is_closed() {
            debug!("connect on a destroyed communicator");
            return feed;
        }
        let mut watcher = self.shared.watcher.lock();
        if watcher.is_some() {
            debug!("communicator already connected");
            return feed;
        }

        let snapshots = self.shared.subscribe();
        let shutdown = self.shared.shutdown.subscribe();
        *watcher = Some(tokio::spawn(watch_queue(
            Arc::clone(&self.shared),
            snapshots,
            shutdown,
        )));
        drop(watcher);
        info!("communicator connected");

        if self.shared.config.autostart_watch {
            let period = Duration::from_millis(self.shared.config.watch_interval_ms);
            let _ticker = self.watch_interval(period);
        }
        if !self.is_empty() {
            self.shared.publish();
        }
        feed
    }

    /// Publish the live queue every `period` until destroyed.
    pub fn watch_interval(&self, period: Duration) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let mut shutdown = self.shared.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticks = interval(period);
            // The first tick completes immediately.
            ticks.tick().await;
            debug!(?period, "interval watch started");

            loop {
                tokio::select! {
                    _ = ticks.tick() => shared.publish(),
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("interval watch stopped");
        })
    }

    /// Drain `tasks` against the target.
    ///
    /// `tasks.len()` entries are removed from the front of the live queue
    /// before this returns; the returned future dispatches every task
    /// concurrently. A failing task is logged and counted, never retried,
    /// and does not stop its siblings.
    pub fn drain(&self, tasks: Vec<MarkedTask<T>>) -> BoxFuture<'static, DrainReport> {
        self.shared.dequeue(tasks.len());
        self.shared.dispatch(tasks)
    }

    /// Drain everything currently queued.
    ///
    /// A published snapshot still waiting for the watcher is retracted, so
    /// mixing `flush` with a connected watcher never dispatches a task twice.
    pub fn flush(&self) -> BoxFuture<'static, DrainReport> {
        let tasks = self.shared.take_all();
        self.shared.dispatch(tasks)
    }

    /// Pull one record from the target into the primary.
    ///
    /// Without explicit strategies, records match when both their id and
    /// their [`Record::record_type`] agree, and the pulled record is overlaid
    /// on the local one. A record with no local match is
    /// inserted under its own id. Returns the record as stored in the
    /// primary, or `None` when the target has no match.
    pub async fn preload(
        &self,
        matcher: Matcher<T>,
        update_equal: Option<EqualFn<T, T>>,
        from_update: Option<FromUpdateFn<T, T>>,
    ) -> Result<Option<T>> {
        let found = match matcher {
            Matcher::Predicate(predicate) => self.shared.target.search(predicate).await?,
            Matcher::EqualTo(payload) => self.shared.target.search_equal_to(payload).await?,
        };
        let Some(item) = found else {
            debug!("preload found nothing to pull");
            return Ok(None);
        };

        let local: Database<T, SyncMode> = Database::builder()
            .update_equal(move |a: &T, b: &T| match &update_equal {
                Some(equal) => equal(a, b),
                None => same_record(a, b),
            })
            .from_update(move |a: &T, b: &T| match &from_update {
                Some(merge) => merge(a, b),
                None => merge_over(a, b),
            })
            .reporting(false)
            .build_on(self.shared.primary.clone());

        let stored = match local.update(item.clone())? {
            Some(updated) => updated,
            None => local.insert(item)?,
        };
        info!(id = stored.id().unwrap_or_default(), "preloaded record");
        Ok(Some(stored))
    }

    /// Stop the queue watcher and interval watch, complete the queue feed
    /// and refuse new tasks.
    ///
    /// Drains already dispatched run to completion.
    pub fn destroy(&self) {
        if self.shared.shutdown.send_replace(true) {
            return;
        }
        self.shared.feed.lock().take();
        self.shared.watcher.lock().take();
        info!(pending = self.len(), "communicator destroyed");
    }
}

impl<T, D> ChangeObserver<T> for Communicator<T, D>
where
    T: Record,
    D: ReplicaTarget<T>,
{
    fn report(&self, operation: Operation, items: &[T]) -> ReportResult {
        let mark = Mark::for_operation(operation);
        for item in items {
            self.submit(MarkedTask::new(mark, item.clone()))
                .map_err(|err| ReportError(err.to_string()))?;
        }
        Ok(())
    }
}

/// Handle to a communicator's queue feed.
pub struct QueueFeed<T, D>
where
    T: Record,
    D: ReplicaTarget<T>,
{
    shared: Arc<Shared<T, D>>,
}

impl<T, D> QueueFeed<T, D>
where
    T: Record,
    D: ReplicaTarget<T>,
{
    /// Publish the live queue, triggering a drain if it is non-empty.
    pub fn publish(&self) {
        self.shared.publish();
    }

    /// Publish an arbitrary snapshot. Its length is what gets dequeued.
    pub fn push(&self, snapshot: Vec<MarkedTask<T>>) {
        self.shared.push(snapshot);
    }

    /// The last published snapshot.
    pub fn latest(&self) -> Vec<MarkedTask<T>> {
        self.shared.last_published.borrow().clone()
    }

    /// Follow published snapshots. `changed()` errors once the communicator
    /// is destroyed.
    pub fn subscribe(&self) -> watch::Receiver<Vec<MarkedTask<T>>> {
        self.shared.subscribe()
    }
}

async fn watch_queue<T, D>(
    shared: Arc<Shared<T, D>>,
    mut snapshots: watch::Receiver<Vec<MarkedTask<T>>>,
    mut shutdown: watch::Receiver<bool>,
) where
    T: Record,
    D: ReplicaTarget<T>,
{
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let tasks = shared.take_published(&mut snapshots);
                if tasks.is_empty() {
                    continue;
                }
                debug!(count = tasks.len(), "draining published snapshot");
                // Drains run detached so a slow target never holds up the next snapshot.
                tokio::spawn(shared.dispatch(tasks));
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!("queue watcher stopped");
}

fn same_record<T: Record>(a: &T, b: &T) -> bool {
    matches!((a.id(), b.id()), (Some(x), Some(y)) if x == y) && a.record_type() == b.record_type()
}

fn merge_over<T: Record>(payload: &T, item: &T) -> T {
    overlay_as(payload, item).unwrap_or_else(|err| {
        warn!(%err, "overlay failed, keeping pulled record");
        payload.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn secondary() -> Arc<Database<Value, AsyncMode>> {
        Arc::new(
            Database::builder()
                .update_equal(|a: &Value, b: &Value| a["name"] == b["name"])
                .remove_equal(|a: &Value, b: &Value| a["name"] == b["name"])
                .to_search(Value::clone)
                .from_update(|a: &Value, b: &Value| rxs_core::overlay(a, b))
                .build(),
        )
    }

    fn communicator() -> Communicator<Value> {
        Communicator::new(ItemStore::new(Vec::new()), secondary())
    }

    #[test]
    fn test_config_builder() {
        let config = CommunicatorConfigBuilder::new()
            .watch_interval(50)
            .autostart_watch(true)
            .build();
        assert_eq!(config.watch_interval_ms, 50);
        assert!(config.autostart_watch);
        assert!(!CommunicatorConfig::default().autostart_watch);
    }

    #[test]
    fn test_report_enqueues_one_task_per_item() {
        let communicator = communicator();
        communicator
            .report(
                Operation::InsertMany,
                &[json!({ "id": "1" }), json!({ "id": "2" })],
            )
            .unwrap();
        communicator.report(Operation::Remove, &[]).unwrap();

        let marks: Vec<Mark> = communicator.pending().iter().map(|t| t.mark).collect();
        assert_eq!(marks, vec![Mark::Insert, Mark::Insert]);
    }

    #[test]
    fn test_drain_dequeues_before_dispatch() {
        let communicator = communicator();
        communicator
            .submit(MarkedTask::insert(json!({ "id": "1", "name": "a" })))
            .unwrap();
        communicator
            .submit(MarkedTask::insert(json!({ "id": "2", "name": "b" })))
            .unwrap();

        let pending = communicator.drain(communicator.pending());
        assert!(communicator.is_empty());

        communicator
            .submit(MarkedTask::insert(json!({ "id": "3", "name": "c" })))
            .unwrap();
        let report = tokio_test::block_on(pending);

        assert_eq!(report, DrainReport { dispatched: 2, failed: 0 });
        assert_eq!(communicator.len(), 1);
    }

    #[test]
    fn test_destroyed_communicator_rejects_tasks() {
        let communicator = communicator();
        communicator.destroy();
        assert!(communicator.is_closed());

        let err = communicator
            .submit(MarkedTask::remove(json!({ "name": "a" })))
            .unwrap_err();
        assert_eq!(err, RelayError::Closed);
        assert!(communicator
            .report(Operation::Insert, &[json!({ "id": "1" })])
            .is_err());
    }

    #[test]
    fn test_same_record_needs_both_ids() {
        assert!(same_record(&json!({ "id": "1", "a": 1 }), &json!({ "id": "1" })));
        assert!(!same_record(&json!({ "id": "1" }), &json!({ "id": "2" })));
        assert!(!same_record(&json!({}), &json!({})));
    }

    #[test]
    fn test_same_record_compares_type() {
        let block = json!({ "id": "1", "type": "block", "text": "a" });
        assert!(same_record(&block, &json!({ "id": "1", "type": "block" })));
        assert!(!same_record(&block, &json!({ "id": "1", "type": "page" })));
        assert!(!same_record(&block, &json!({ "id": "1" })));
    }

    #[test]
    fn test_merge_over_prefers_payload() {
        let merged = merge_over(
            &json!({ "id": "1", "age": 12 }),
            &json!({ "id": "1", "name": "alex", "age": 11 }),
        );
        assert_eq!(merged, json!({ "id": "1", "name": "alex", "age": 12 }));
    }
}
