//! Error types for storage operations.

use relmap_core::CoreError;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A snapshot could not be encoded or decoded.
    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A row's identity is already taken.
    #[error("duplicate id {id} in table {table}")]
    DuplicateId {
        /// The table.
        table: String,
        /// The rendered identity value.
        id: String,
    },

    /// A row would repeat the values of a unique field tuple.
    #[error("unique constraint {fields:?} violated in table {table} by {values}")]
    ConstraintViolation {
        /// The table.
        table: String,
        /// The constrained fields.
        fields: Vec<String>,
        /// The rendered offending values.
        values: String,
    },

    /// An update or delete named a row without an identity.
    #[error("row in table {table} has no value for identity field {id_field}")]
    MissingId {
        /// The table.
        table: String,
        /// The identity field.
        id_field: String,
    },

    /// `begin` was called while a transaction is open.
    #[error("a storage transaction is already open")]
    TransactionOpen,

    /// `commit` or `rollback` was called with no open transaction.
    #[error("no storage transaction is open")]
    NoTransaction,

    /// A snapshot file is structurally invalid.
    #[error("snapshot corrupted: {0}")]
    Corrupted(String),
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        CoreError::backend_source(err.to_string(), err)
    }
}
