//! Index error types.

use thiserror::Error;

/// A predicate could not be turned into an index query.
///
/// Raised while building a query source, before any search runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Query parse error: {0}")]
pub struct QueryParseError(pub String);

impl QueryParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Tantivy index error
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid predicate
    #[error(transparent)]
    QueryParse(#[from] QueryParseError),

    /// Search or stored-field fetch failed
    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    /// Replace, delete or delete-all did not complete
    #[error("Write failed for {key}: {reason}")]
    Write { key: String, reason: String },

    /// The writer worker has shut down
    #[error("Index writer is closed")]
    WriterClosed,

    /// On-disk index does not match the expected schema
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Schema definition is inconsistent
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Version state file could not be read or written
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Settings rejected at open time
    #[error(transparent)]
    Config(#[from] entity_types::TypesError),
}

impl IndexError {
    /// Whether this error came from an I/O-level failure (storage or engine)
    /// rather than from an invalid request.
    pub fn is_io(&self) -> bool {
        !matches!(
            self,
            IndexError::QueryParse(_) | IndexError::InvalidSchema(_) | IndexError::Config(_)
        )
    }
}
