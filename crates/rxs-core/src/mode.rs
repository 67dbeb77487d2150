//! Execution modes shared by every layer of the store.
//!
//! A store is built either synchronous or asynchronous and never changes
//! afterwards. The mode decides the *shape* of every result:
//!
//! - [`SyncMode`]: operations hand back their value directly.
//! - [`AsyncMode`]: operations hand back a [`Deferred`] that resolves to the
//!   value. The underlying write has already happened by the time the handle
//!   is returned; only the signalling is deferred.
//!
//! Code that must work in both modes (the item store, the database) builds
//! its results through the combinators on [`Mode`] instead of branching.

use crate::cell::{Store, StoreAsync, StoreSync};
use futures::future::{self, BoxFuture, FutureExt};

/// A single-value deferred result. Resolves exactly once and never errors.
pub type Deferred<T> = BoxFuture<'static, T>;

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::SyncMode {}
    impl Sealed for super::AsyncMode {}
}

/// Marker for blocking stores: results are plain values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SyncMode;

/// Marker for deferred stores: results are [`Deferred`] handles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AsyncMode;

/// The execution discipline of a store.
///
/// Sealed: only [`SyncMode`] and [`AsyncMode`] exist.
pub trait Mode: sealed::Sealed + Send + Sync + Sized + 'static {
    /// `true` for [`AsyncMode`].
    const IS_ASYNC: bool;

    /// Result shape of an operation producing `T`.
    type Out<T: Send + 'static>: Send + 'static;

    /// The mutable cell used by stores of this mode.
    type Cell<S: Clone + Send + Sync + 'static>: Store<S, Mode = Self>;

    /// Wrap an already computed value.
    fn ready<T: Send + 'static>(value: T) -> Self::Out<T>;

    /// Transform the value once it is available.
    fn map<T, U, F>(out: Self::Out<T>, f: F) -> Self::Out<U>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static;

    /// Chain a second operation of the same mode.
    fn and_then<T, U, F>(out: Self::Out<T>, f: F) -> Self::Out<U>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: FnOnce(T) -> Self::Out<U> + Send + 'static;

    /// Combine results, preserving their order.
    fn join_all<T: Send + 'static>(outs: Vec<Self::Out<T>>) -> Self::Out<Vec<T>>;
}

impl Mode for SyncMode {
    const IS_ASYNC: bool = false;

    type Out<T: Send + 'static> = T;
    type Cell<S: Clone + Send + Sync + 'static> = StoreSync<S>;

    fn ready<T: Send + 'static>(value: T) -> T {
        value
    }

    fn map<T, U, F>(out: T, f: F) -> U
    where
        T: Send + 'static,
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        f(out)
    }

    fn and_then<T, U, F>(out: T, f: F) -> U
    where
        T: Send + 'static,
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        f(out)
    }

    fn join_all<T: Send + 'static>(outs: Vec<T>) -> Vec<T> {
        outs
    }
}

impl Mode for AsyncMode {
    const IS_ASYNC: bool = true;

    type Out<T: Send + 'static> = Deferred<T>;
    type Cell<S: Clone + Send + Sync + 'static> = StoreAsync<S>;

    fn ready<T: Send + 'static>(value: T) -> Deferred<T> {
        future::ready(value).boxed()
    }

    fn map<T, U, F>(out: Deferred<T>, f: F) -> Deferred<U>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        out.map(f).boxed()
    }

    fn and_then<T, U, F>(out: Deferred<T>, f: F) -> Deferred<U>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: FnOnce(T) -> Deferred<U> + Send + 'static,
    {
        async move { f(out.await).await }.boxed()
    }

    fn join_all<T: Send + 'static>(outs: Vec<Deferred<T>>) -> Deferred<Vec<T>> {
        future::join_all(outs).boxed()
    }
}
