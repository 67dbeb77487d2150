//! # rxs-db
//!
//! Item store and database layer of the Sardonyx reactive store.
//!
//! This crate provides:
//! - [`ItemStore`]: item-level operations compiled into whole-collection
//!   cell dispatches, with single-shot and live lookups
//! - [`Database`]: CRUD with id assignment and pluggable match/merge
//!   [`Strategies`]
//! - [`ChangeObserver`]: the hook a replication relay uses to hear about
//!   completed mutations
//!
//! ## Example
//!
//! ```rust,ignore
//! use rxs_core::{overlay, SyncMode};
//! use rxs_db::Database;
//! use serde_json::{json, Value};
//!
//! let db: Database<Value, SyncMode> = Database::builder()
//!     .items(vec![json!({ "id": "1", "name": "item1", "price": 10 })])
//!     .update_equal(|payload: &Value, item: &Value| payload["name"] == item["name"])
//!     .from_update(|payload: &Value, item: &Value| overlay(payload, item))
//!     .build();
//!
//! let merged = db.update(json!({ "name": "item1", "price": 12 }))?;
//! assert_eq!(merged.unwrap()["price"], 12);
//! ```

pub mod database;
pub mod error;
pub mod item_store;
pub mod observer;
pub mod record;
pub mod strategy;

pub use database::Database;
pub use error::{DbError, Result, StrategyKind};
pub use item_store::{ItemStore, LiveQuery};
pub use observer::{ChangeObserver, Operation, ReportError, ReportResult};
pub use record::{
    default_id_generator, stamp_id, strip_id, uuid_v4, IdGenerator, Record, ID_FIELD, TYPE_FIELD,
};
pub use strategy::{DatabaseBuilder, EqualFn, FromUpdateFn, Strategies, ToSearchFn};
