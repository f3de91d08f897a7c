//! Typed storage failures
//!
//! Driver errors are classified by SQLSTATE so callers branch on the kind of
//! failure rather than on message text.

use thiserror::Error;

/// Storage error kinds
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unique violation: {0}")]
    UniqueViolation(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Check violation: {0}")]
    CheckViolation(String),

    /// Serialization failure or deadlock; the transaction may be retried
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Classify a database error by its SQLSTATE code
    pub fn from_sqlstate(code: &str, detail: String) -> Self {
        match code {
            "23505" => StorageError::UniqueViolation(detail),
            "23503" => StorageError::ForeignKeyViolation(detail),
            "23514" => StorageError::CheckViolation(detail),
            "40001" | "40P01" => StorageError::SerializationFailure(detail),
            c if c.starts_with("08") => StorageError::Connection(detail),
            _ => StorageError::Query(detail),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::SerializationFailure(_) | StorageError::Connection(_)
        )
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db_err) => {
                let detail = match db_err.constraint() {
                    Some(constraint) => format!("{} ({})", db_err.message(), constraint),
                    None => db_err.message().to_string(),
                };
                match db_err.code() {
                    Some(code) => StorageError::from_sqlstate(&code, detail),
                    None => StorageError::Query(detail),
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::Connection(err.to_string())
            }
            sqlx::Error::Tls(_) => StorageError::Connection(err.to_string()),
            _ => StorageError::Query(err.to_string()),
        }
    }
}
