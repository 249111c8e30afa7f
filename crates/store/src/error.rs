//! Error types for the record store

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the record store
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite database error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Table or column name outside `[A-Za-z_][A-Za-z0-9_]*`
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Table definition that cannot be created
    #[error("Malformed schema for table {table}: {reason}")]
    MalformedSchema { table: String, reason: String },

    /// The store was closed
    #[error("Record store is closed")]
    Closed,

    /// Database corruption or schema mismatch
    #[error("Database error: {0}")]
    Database(String),
}

impl Error {
    /// Create a database error with a message
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn malformed_schema(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedSchema { table: table.into(), reason: reason.into() }
    }
}

impl From<Error> for chatdesk_core::Error {
    fn from(err: Error) -> Self {
        chatdesk_core::Error::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::malformed_schema("logs", "no columns");
        assert_eq!(err.to_string(), "Malformed schema for table logs: no columns");

        let err = Error::InvalidIdentifier("drop table".to_string());
        assert_eq!(err.to_string(), "Invalid identifier: \"drop table\"");
    }

    #[test]
    fn test_library_errors_convert() {
        let sqlite: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(sqlite, Error::Sqlite(_)));

        let json: Error = serde_json::from_str::<Vec<u8>>("{").unwrap_err().into();
        assert!(matches!(json, Error::Json(_)));
    }

    #[test]
    fn test_into_core_persistence_error() {
        let err: chatdesk_core::Error = Error::Closed.into();
        assert!(matches!(err, chatdesk_core::Error::Persistence(_)));
        assert_eq!(err.to_string(), "persistence error: Record store is closed");
    }
}
