//! # rxs-relay
//!
//! One-directional replication between Sardonyx stores.
//!
//! A sync primary [`Database`](rxs_db::Database) reports each completed
//! mutation to a [`Communicator`], which queues it as a [`MarkedTask`].
//! Queued tasks are drained against a [`ReplicaTarget`], typically an async
//! database, either on demand or whenever the queue feed publishes a
//! non-empty snapshot.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rxs_relay::{Communicator, MarkedTask};
//!
//! let communicator = Communicator::new(primary_store.clone(), Arc::new(secondary));
//! primary.attach_observer(communicator.observer());
//!
//! let feed = communicator.connect();
//! communicator.watch_interval(Duration::from_millis(100));
//!
//! primary.insert(json!({ "name": "alex" }))?;
//! feed.publish(); // or wait for the next tick
//! ```

pub mod communicator;
pub mod error;
pub mod target;
pub mod task;

pub use communicator::{
    Communicator, CommunicatorConfig, CommunicatorConfigBuilder, DrainReport, Matcher, QueueFeed,
};
pub use error::{RelayError, Result};
pub use target::{Predicate, ReplicaTarget};
pub use task::{Mark, MarkedTask};
