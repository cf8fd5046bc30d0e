//! Error types for the emulation layer.
//!
//! Storage, serialization and validation failures inside the crate are
//! propagated as [`StoreError`]. Callers of the query builder never see these
//! directly: the builder folds them into the [`ErrorSlot`] of its result
//! envelope.

use serde::{Deserialize, Serialize};

/// Errors raised while reading, writing or validating the persisted store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An LMDB environment or transaction failed.
    #[error("LMDB error: {0}")]
    Lmdb(#[from] lmdb::Error),

    /// Creating the storage directory failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A row does not satisfy the shape of its record type.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A table name that is not one of the five collections.
    #[error("Unknown table: {0}")]
    UnknownTable(String),
}

/// The `error` slot of a result envelope.
///
/// Serialized as `{ "message": "..." }`, the shape page code already checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSlot {
    pub message: String,
}

impl ErrorSlot {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn insert_failed() -> Self {
        Self::new("insert failed")
    }

    pub fn update_failed() -> Self {
        Self::new("update failed")
    }

    pub fn delete_failed() -> Self {
        Self::new("delete failed")
    }
}
