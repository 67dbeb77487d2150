//! Change reporting from a database to an external observer.
//!
//! After each mutating operation completes the database calls
//! [`ChangeObserver::report`] with the operation and the records it
//! produced. Reporting is fire-and-forget: a rejected report is logged and
//! never alters the operation's own result.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The mutating database operations that are reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Insert,
    InsertMany,
    Remove,
    RemoveMany,
    Update,
    UpdateMany,
    Upsert,
    UpsertMany,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::Insert,
        Operation::InsertMany,
        Operation::Remove,
        Operation::RemoveMany,
        Operation::Update,
        Operation::UpdateMany,
        Operation::Upsert,
        Operation::UpsertMany,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::InsertMany => "insertMany",
            Operation::Remove => "remove",
            Operation::RemoveMany => "removeMany",
            Operation::Update => "update",
            Operation::UpdateMany => "updateMany",
            Operation::Upsert => "upsert",
            Operation::UpsertMany => "upsertMany",
        }
    }

    /// Whether the operation works on a batch of payloads.
    pub fn is_batch(&self) -> bool {
        matches!(
            self,
            Operation::InsertMany
                | Operation::RemoveMany
                | Operation::UpdateMany
                | Operation::UpsertMany
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why an observer refused a report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("report rejected: {0}")]
pub struct ReportError(pub String);

pub type ReportResult = std::result::Result<(), ReportError>;

/// Receives a database's completed mutations.
///
/// `items` holds the records the operation returned: the inserted, removed
/// or merged records, with absent results left out.
pub trait ChangeObserver<T>: Send + Sync {
    fn report(&self, operation: Operation, items: &[T]) -> ReportResult;
}
