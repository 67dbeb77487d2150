//! Error types for the replication relay.

use rxs_db::DbError;
use thiserror::Error;

/// Errors raised by the communicator or its replication target.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The communicator was destroyed.
    #[error("Communicator closed")]
    Closed,

    /// The replication target failed to apply a task.
    #[error("Replica target error: {0}")]
    Target(String),

    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

pub type Result<T> = std::result::Result<T, RelayError>;
