pub mod contests;
pub mod participations;
pub mod payments;
pub mod users;

pub use contests::*;
pub use participations::*;
pub use payments::*;
pub use users::*;

use arena_core::CoreError;
use thiserror::Error;

use crate::infra::db::DatabaseWriteError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),
    /// A business rule saw the record already in the requested state
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("payment gateway request failed: {0}")]
    Upstream(String),
    /// Stored data contradicts an invariant the ledger relies on
    #[error("ledger integrity violation: {0}")]
    Integrity(String),
    #[error("problem querying db: {0}")]
    DbError(#[from] sqlx::Error),
    #[error("database write not acquired: {0}")]
    WriteUnavailable(String),
    #[error("background task failure: {0}")]
    BackgroundTask(String),
}

impl From<CoreError> for Error {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) | CoreError::InvalidAmount(msg) => Error::Validation(msg),
            e @ CoreError::UnknownVariant { .. } => Error::Validation(e.to_string()),
        }
    }
}

impl From<DatabaseWriteError> for Error {
    fn from(err: DatabaseWriteError) -> Self {
        match err {
            DatabaseWriteError::Sqlx(e) => Error::DbError(e),
            e @ DatabaseWriteError::LockTimeout(_) => Error::WriteUnavailable(e.to_string()),
        }
    }
}
