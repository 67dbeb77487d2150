//! Error types for the database layer.

use std::fmt;
use thiserror::Error;

/// The pluggable strategies a [`Database`](crate::Database) may be built with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    UpdateEqual,
    RemoveEqual,
    ToSearch,
    FromUpdate,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::UpdateEqual => "update_equal",
            StrategyKind::RemoveEqual => "remove_equal",
            StrategyKind::ToSearch => "to_search",
            StrategyKind::FromUpdate => "from_update",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in database operations.
///
/// Not-found is never an error: lookups that match nothing return `None`
/// or an empty `Vec`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    /// The operation needs a strategy this database was built without.
    #[error("Strategy not configured: {0}() is undefined")]
    MissingStrategy(StrategyKind),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A payload could not be turned into a record.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
