//! Error types for the device store.

use thiserror::Error;

/// Result type alias for device store operations.
pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("association was not found for resource {0}")]
    AssociationNotFound(String),

    #[error("invalid device descriptor: {0}")]
    Validation(String),

    /// The target device changed under the transaction; placement must be retried.
    #[error("error adding association: {0}")]
    Association(String),

    #[error("resource already associated: {0}")]
    Conflict(String),

    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("store is inconsistent: {0}")]
    Inconsistent(String),
}
