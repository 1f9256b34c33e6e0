//! Error types and result handling for item store operations.
//!
//! Distinguishes transient infrastructure failures from constraint and
//! input problems so callers can decide whether an item was merely "not
//! processed this sweep" or genuinely invalid.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error type for item store and domain operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database operation failed. Treated as transient by the sweep: the
    /// item stays pending and is retried on a later pass.
    #[error("database error: {0}")]
    Database(String),

    /// Entity not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Constraint violation, e.g. duplicate access token.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::ConstraintViolation(format!("unique constraint violation: {db_err}"))
            },
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                Self::ConstraintViolation(format!("check constraint violation: {db_err}"))
            },
            _ => Self::Database(err.to_string()),
        }
    }
}
