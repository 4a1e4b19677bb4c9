//! Common error types for Pulse

use thiserror::Error;

/// Common result type for Pulse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Pulse services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading error (TOML, root folder, missing keys)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed input or configuration value, one message per field
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or invalid credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but the role does not permit the action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Write collided with concurrent state (duplicate id, stale version)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// AI backend failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// Temporary failure; the caller may retry or fall back to a default
    #[error("Temporarily unavailable: {0}")]
    Transient(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a validation error carrying a single message
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(vec![message.into()])
    }

    /// Whether retrying the same call later may succeed
    ///
    /// SQLite reports lock contention as a database error; those count as
    /// transient alongside explicit `Transient` errors and pool timeouts.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transient(_) => true,
            Error::Database(sqlx::Error::PoolTimedOut) => true,
            Error::Database(sqlx::Error::Database(db_err)) => {
                let message = db_err.message();
                message.contains("database is locked") || message.contains("database is busy")
            }
            _ => false,
        }
    }
}
