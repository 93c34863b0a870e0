//! Core error types for quizscreen-core.
//!
//! This module defines the error hierarchy using thiserror. Every fallible
//! operation in the library surfaces one of these types; callers at the
//! service boundary receive them as ordinary `Result` values.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for quizscreen-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Budget state machine errors
    #[error("Budget error: {0}")]
    Budget(#[from] BudgetError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Errors produced by the budget state machine.
#[derive(Error, Debug)]
pub enum BudgetError {
    /// Start or resume requested with an empty balance and no grant to spend.
    #[error("No screen-time budget available to start the timer")]
    NoBudget,

    /// Negative or non-finite amount passed to a grant call.
    #[error("Invalid grant amount: {value}")]
    InvalidGrant { value: f64 },
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Record could not be encoded for storage
    #[error("Record encoding failed: {0}")]
    Encode(String),

    /// Durable write did not complete within the configured interval
    #[error("Database operation timed out")]
    Timeout,

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Data directory could not be created
    #[error("Data directory error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for DatabaseError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        DatabaseError::Timeout
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
