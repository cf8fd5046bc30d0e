use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Envelope returned across the C ABI.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum AppResponse {
    DatabaseError(String),
    SerializationError(String),
    NotFound(String),
    ValidationError(String),
    BadRequest(String),
    Ok(String),
}

impl Display for AppResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppResponse::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppResponse::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppResponse::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppResponse::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppResponse::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppResponse::Ok(msg) => write!(f, "Ok: {}", msg),
        }
    }
}

impl From<StoreError> for AppResponse {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownTable(name) => {
                AppResponse::NotFound(format!("Table '{}' not found", name))
            }
            StoreError::Validation(msg) => AppResponse::ValidationError(msg),
            StoreError::Serialization(e) => {
                AppResponse::SerializationError(format!("JSON serialization error: {}", e))
            }
            StoreError::Lmdb(e) => AppResponse::DatabaseError(format!("LMDB error: {}", e)),
            StoreError::Io(e) => AppResponse::DatabaseError(format!("IO error: {}", e)),
        }
    }
}

impl AppResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        AppResponse::Ok(msg.into())
    }
}
