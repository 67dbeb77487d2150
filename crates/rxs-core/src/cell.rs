//! Mutable cells: one snapshot, a write-by-transform, and a change feed.
//!
//! A cell holds a single state value that is only ever replaced, never
//! mutated in place. Writers hand the cell a transform `&S -> S`; the cell
//! owns whatever the transform returns and publishes a copy of it on the
//! change feed. Readers always receive clones, so nothing outside the cell
//! can alias the stored snapshot.
//!
//! Two concrete cells share this contract:
//!
//! - [`StoreSync`] returns its own handle from `dispatch` and exposes
//!   [`StoreSync::state`].
//! - [`StoreAsync`] returns a [`Deferred`] handle from `dispatch` and only
//!   exposes its state through the feed.
//!
//! Both apply the transform at call time. Dispatches against one cell are
//! totally ordered and every subscriber sees snapshots in that order.

use crate::mode::{AsyncMode, Deferred, Mode, SyncMode};
use async_stream::stream;
use futures::channel::mpsc::{self, UnboundedSender};
use futures::future::{self, FutureExt};
use futures::stream::{BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, trace};

/// Replay-latest change feed: the current snapshot, then every later one,
/// ending once the cell is destroyed.
pub type StateFeed<S> = BoxStream<'static, S>;

/// Configuration for a cell.
#[derive(Clone, Debug)]
pub struct CellConfig {
    /// Label attached to the cell's tracing events.
    pub name: String,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            name: "cell".to_string(),
        }
    }
}

/// Builder for cell configuration.
pub struct CellConfigBuilder {
    config: CellConfig,
}

impl CellConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CellConfig::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn build(self) -> CellConfig {
        self.config
    }
}

impl Default for CellConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The capability shared by both cells.
pub trait Store<S>: Clone + Send + Sync + 'static
where
    S: Clone + Send + Sync + 'static,
{
    /// The mode this cell signals in.
    type Mode: Mode;

    /// Create a cell holding `initial`.
    fn with_config(initial: S, config: CellConfig) -> Self;

    /// Create a cell with the default configuration.
    fn new(initial: S) -> Self {
        Self::with_config(initial, CellConfig::default())
    }

    /// Replace the snapshot with `transform(current)`.
    ///
    /// The transform runs exactly once, before this returns. It must not
    /// call back into the same cell.
    fn dispatch<F>(&self, transform: F) -> <Self::Mode as Mode>::Out<Self>
    where
        F: FnOnce(&S) -> S;

    /// Derive a value from the latest snapshot.
    fn read<R, F>(&self, f: F) -> <Self::Mode as Mode>::Out<R>
    where
        R: Send + 'static,
        F: FnOnce(&S) -> R + Send + 'static;

    /// Subscribe to the change feed.
    fn state_feed(&self) -> StateFeed<S>;

    /// Complete the change feed. Terminal.
    fn destroy(&self);

    /// Whether [`Store::destroy`] has been called.
    fn is_destroyed(&self) -> bool;

    fn is_async(&self) -> bool {
        <Self::Mode as Mode>::IS_ASYNC
    }
}

/// State and subscribers shared by all handles of one cell.
///
/// Every subscriber owns an unbounded queue, so a slow reader buffers
/// snapshots instead of losing them. `None` once destroyed.
struct CellCore<S> {
    name: String,
    state: RwLock<S>,
    subscribers: Mutex<Option<Vec<UnboundedSender<S>>>>,
}

impl<S> CellCore<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn new(initial: S, config: CellConfig) -> Self {
        Self {
            name: config.name,
            state: RwLock::new(initial),
            subscribers: Mutex::new(Some(Vec::new())),
        }
    }

    fn apply<F>(&self, transform: F)
    where
        F: FnOnce(&S) -> S,
    {
        // The write lock is held while publishing so that subscribers, which
        // take the read lock, never observe a snapshot twice or miss one.
        let mut state = self.state.write();
        let next = transform(&*state);
        *state = next;

        match self.subscribers.lock().as_mut() {
            Some(subscribers) => {
                // Dropped feeds are pruned here.
                subscribers.retain(|tx| tx.unbounded_send((*state).clone()).is_ok());
                trace!(cell = %self.name, receivers = subscribers.len(), "published snapshot");
            }
            None => debug!(cell = %self.name, "dispatch on a destroyed cell, snapshot not published"),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&*self.state.read())
    }

    fn subscribe(&self) -> StateFeed<S> {
        let state = self.state.read();
        let receiver = self.subscribers.lock().as_mut().map(|subscribers| {
            let (tx, rx) = mpsc::unbounded();
            subscribers.push(tx);
            rx
        });
        let current = (*state).clone();
        drop(state);

        let Some(mut receiver) = receiver else {
            return futures::stream::empty().boxed();
        };

        stream! {
            yield current;
            while let Some(snapshot) = receiver.next().await {
                yield snapshot;
            }
        }
        .boxed()
    }

    fn destroy(&self) {
        if self.subscribers.lock().take().is_some() {
            debug!(cell = %self.name, "cell destroyed, change feed completed");
        }
    }

    fn is_destroyed(&self) -> bool {
        self.subscribers.lock().is_none()
    }
}

/// A cell whose operations complete immediately.
pub struct StoreSync<S> {
    core: Arc<CellCore<S>>,
}

impl<S> Clone for StoreSync<S> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<S> StoreSync<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// A copy of the current snapshot.
    pub fn state(&self) -> S {
        self.core.with_state(S::clone)
    }
}

impl<S> Store<S> for StoreSync<S>
where
    S: Clone + Send + Sync + 'static,
{
    type Mode = SyncMode;

    fn with_config(initial: S, config: CellConfig) -> Self {
        Self {
            core: Arc::new(CellCore::new(initial, config)),
        }
    }

    fn dispatch<F>(&self, transform: F) -> Self
    where
        F: FnOnce(&S) -> S,
    {
        self.core.apply(transform);
        self.clone()
    }

    fn read<R, F>(&self, f: F) -> R
    where
        R: Send + 'static,
        F: FnOnce(&S) -> R + Send + 'static,
    {
        self.core.with_state(f)
    }

    fn state_feed(&self) -> StateFeed<S> {
        self.core.subscribe()
    }

    fn destroy(&self) {
        self.core.destroy();
    }

    fn is_destroyed(&self) -> bool {
        self.core.is_destroyed()
    }
}

/// A cell whose operations signal completion through [`Deferred`] handles.
pub struct StoreAsync<S> {
    core: Arc<CellCore<S>>,
}

impl<S> Clone for StoreAsync<S> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<S> Store<S> for StoreAsync<S>
where
    S: Clone + Send + Sync + 'static,
{
    type Mode = AsyncMode;

    fn with_config(initial: S, config: CellConfig) -> Self {
        Self {
            core: Arc::new(CellCore::new(initial, config)),
        }
    }

    fn dispatch<F>(&self, transform: F) -> Deferred<Self>
    where
        F: FnOnce(&S) -> S,
    {
        self.core.apply(transform);
        future::ready(self.clone()).boxed()
    }

    /// Resolves from the first snapshot the feed delivers after this call,
    /// i.e. the latest one at call time. A destroyed cell is read directly.
    fn read<R, F>(&self, f: F) -> Deferred<R>
    where
        R: Send + 'static,
        F: FnOnce(&S) -> R + Send + 'static,
    {
        let mut feed = self.core.subscribe();
        let core = Arc::clone(&self.core);
        async move {
            match feed.next().await {
                Some(snapshot) => f(&snapshot),
                None => core.with_state(f),
            }
        }
        .boxed()
    }

    fn state_feed(&self) -> StateFeed<S> {
        self.core.subscribe()
    }

    fn destroy(&self) {
        self.core.destroy();
    }

    fn is_destroyed(&self) -> bool {
        self.core.is_destroyed()
    }
}
