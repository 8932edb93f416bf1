//! Errors surfaced by index store implementations

use std::io;

/// Failure of an index store operation
///
/// Variants are kept distinct so callers can map them to different outcomes
/// (for example 404 for [`IndexError::NotFound`], 500 for the rest).
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Zero or more than one document matched an id lookup
    #[error("Not found: {id}")]
    NotFound { id: String },

    /// The index could not be opened, is closed, or the service is unreachable
    #[error("Storage unavailable: {message}")]
    StorageUnavailable { message: String },

    /// The query string could not be parsed
    #[error("Query syntax error: {message}")]
    QuerySyntax { message: String },

    /// Generic read/write failure
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Stored data does not match the schema the reading code expects
    #[error("Schema violation: {message}")]
    SchemaViolation { message: String },

    /// The operation was cancelled or ran past its deadline
    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl IndexError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<io::Error> for IndexError {
    fn from(e: io::Error) -> Self {
        IndexError::io(e.to_string())
    }
}

impl From<tantivy::TantivyError> for IndexError {
    fn from(e: tantivy::TantivyError) -> Self {
        use tantivy::TantivyError;
        match e {
            TantivyError::LockFailure(..) => IndexError::unavailable(e.to_string()),
            TantivyError::SchemaError(_) | TantivyError::FieldNotFound(_) => {
                IndexError::schema(e.to_string())
            }
            other => IndexError::io(other.to_string()),
        }
    }
}

impl From<tantivy::query::QueryParserError> for IndexError {
    fn from(e: tantivy::query::QueryParserError) -> Self {
        IndexError::QuerySyntax {
            message: e.to_string(),
        }
    }
}
