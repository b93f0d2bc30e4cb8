//! Error types for the FleetGrid state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    /// A redb transaction, table, read, or write step failed.
    #[error("storage error during {op}: {message}")]
    Storage { op: &'static str, message: String },

    #[error("failed to encode {table} record: {message}")]
    Encode { table: String, message: String },

    #[error("failed to decode {table} record: {message}")]
    Decode { table: String, message: String },

    /// Identifiers become key segments and must not contain the separator.
    #[error("invalid key segment {0:?}: must be non-empty and must not contain ':'")]
    InvalidKey(String),

    #[error("not found: {0}")]
    NotFound(String),
}
