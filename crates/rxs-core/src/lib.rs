//! # rxs-core
//!
//! Building blocks of the Sardonyx reactive store.
//!
//! - [`cell`]: mutable cells holding one immutable snapshot, in a blocking
//!   ([`StoreSync`]) and a deferred ([`StoreAsync`]) flavour, each with a
//!   replay-latest change feed.
//! - [`mode`]: the [`SyncMode`]/[`AsyncMode`] markers that fix the result
//!   shape of every operation built on a cell.
//! - [`collection`]: an ordered [`Collection`] with non-mutating transforms.
//! - [`structural`]: one-sided structural equality and shallow merge.
//!
//! ## Example
//!
//! ```rust
//! use rxs_core::{Collection, Store, StoreSync};
//!
//! let cell = StoreSync::new(Collection::from(vec![1, 2, 3]));
//! cell.dispatch(|xs| xs.filter(|x| *x != 2));
//!
//! assert_eq!(cell.state().into_vec(), vec![1, 3]);
//! ```

pub mod cell;
pub mod collection;
pub mod mode;
pub mod structural;

pub use cell::{CellConfig, CellConfigBuilder, StateFeed, Store, StoreAsync, StoreSync};
pub use collection::Collection;
pub use mode::{AsyncMode, Deferred, Mode, SyncMode};
pub use structural::{equal, equal_to, overlay, overlay_as};
