//! Marked tasks: a payload tagged with the operation to replay it through.

use rxs_db::Operation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which target operation a queued payload is dispatched through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mark {
    Insert,
    Update,
    Upsert,
    Remove,
}

impl Mark {
    /// The mark under which a reported operation's records are replayed.
    /// Batch operations map onto their single-record counterpart.
    pub fn for_operation(operation: Operation) -> Mark {
        match operation {
            Operation::Insert | Operation::InsertMany => Mark::Insert,
            Operation::Remove | Operation::RemoveMany => Mark::Remove,
            Operation::Update | Operation::UpdateMany => Mark::Update,
            Operation::Upsert | Operation::UpsertMany => Mark::Upsert,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mark::Insert => "insert",
            Mark::Update => "update",
            Mark::Upsert => "upsert",
            Mark::Remove => "remove",
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued payload and its mark.
///
/// Serialised flat: `{ "mark": "insert", ...payload }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkedTask<T> {
    pub mark: Mark,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> MarkedTask<T> {
    pub fn new(mark: Mark, payload: T) -> Self {
        Self { mark, payload }
    }

    pub fn insert(payload: T) -> Self {
        Self::new(Mark::Insert, payload)
    }

    pub fn update(payload: T) -> Self {
        Self::new(Mark::Update, payload)
    }

    pub fn upsert(payload: T) -> Self {
        Self::new(Mark::Upsert, payload)
    }

    pub fn remove(payload: T) -> Self {
        Self::new(Mark::Remove, payload)
    }

    /// Split off the mark, leaving the bare payload.
    pub fn into_parts(self) -> (Mark, T) {
        (self.mark, self.payload)
    }
}
