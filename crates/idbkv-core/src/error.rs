//! Error types

use thiserror::Error;

use crate::key::Key;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failures reported by a host storage engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The host has no storage engine
    #[error("storage engine not available: {0}")]
    NotAvailable(String),

    /// Database open or upgrade failed
    #[error("open failed: {0}")]
    Open(String),

    /// Another open connection prevents the request from proceeding
    #[error("blocked by an open connection: {0}")]
    Blocked(String),

    /// A uniqueness constraint was violated (e.g. key collision on add)
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Invalid key or value
    #[error("data error: {0}")]
    Data(String),

    /// The named object store does not exist
    #[error("object store not found: {0}")]
    StoreNotFound(String),

    /// The transaction was aborted
    #[error("transaction aborted: {0}")]
    Aborted(String),

    /// A request failed for another reason
    #[error("request failed: {0}")]
    Request(String),

    /// A cursor failed while advancing
    #[error("cursor failed: {0}")]
    Cursor(String),
}

/// Errors surfaced by [`crate::StorageClient`].
///
/// Every client operation resolves with its success value or exactly one of
/// these. Nothing is retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// Opening or upgrading the database failed
    #[error("failed to open database '{database}': {source}")]
    Connection {
        database: String,
        #[source]
        source: EngineError,
    },

    /// An operation was attempted without a live connection
    #[error("database not open")]
    NotOpen,

    /// Insert or update rejected, or its transaction aborted
    #[error("write failed: {0}")]
    Write(#[source] EngineError),

    /// Lookup or scan failed
    #[error("read failed: {0}")]
    Read(#[source] EngineError),

    /// Record or database deletion failed
    #[error("delete failed: {0}")]
    Delete(#[source] EngineError),

    /// Update target does not exist
    #[error("no record found for key {0}")]
    NotFound(Key),
}

impl ClientError {
    /// The engine failure behind this error, if any.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            ClientError::Connection { source, .. } => Some(source),
            ClientError::Write(e) | ClientError::Read(e) | ClientError::Delete(e) => Some(e),
            ClientError::NotOpen | ClientError::NotFound(_) => None,
        }
    }
}
