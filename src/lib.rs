//! # Wanderlust Store
//!
//! A local stand-in for the hosted backend of the Wanderlust tour-booking
//! storefront. It reproduces the backend's query semantics (filtering,
//! ordering, pagination, foreign-key joins, writes) over five collections kept
//! in a single LMDB-persisted blob, so the storefront runs unmodified with or
//! without a network backend.
//!
//! ## Features
//!
//! - **Chainable queries**: `select`, `eq`, `gte`, `lte`, `ilike`, `or`,
//!   `order`, `range`, `limit`, evaluated lazily in a fixed order
//! - **Typed records**: tours, users, bookings, reviews and wishlists are
//!   validated at the store boundary
//! - **Self-healing catalog**: seeding, catalog coverage and tour
//!   deduplication run on every read and are idempotent
//! - **FFI-ready**: a C ABI taking JSON request documents
//! - **Safe error handling**: failures land in the result's `error` slot, no
//!   `unwrap()` in production code
//!
//! ## Quick Start
//!
//! ```no_run
//! use wanderlust_store::local_db_model::Tour;
//! use wanderlust_store::local_db_state::LocalDb;
//! use wanderlust_store::query::{Direction, SelectOptions};
//!
//! let db = LocalDb::in_memory();
//! let result = db
//!     .from::<Tour>()
//!     .select_with("*", SelectOptions::exact())
//!     .eq("difficulty", "easy")
//!     .order("price", Direction::Ascending)
//!     .range(0, 8)
//!     .execute();
//!
//! println!("{} of {} easy tours", result.data.len(), result.count);
//! ```
//!
//! ## FFI Functions
//!
//! - [`create_client`] - Open the LMDB-backed store
//! - [`execute_request`] - Run a JSON [`QueryRequest`](request::QueryRequest)
//! - [`reset_store`] - Clear and reseed the store
//! - [`is_emulated`] - Whether the environment selects the local backend
//! - [`close_client`] - Release a client
//! - [`free_c_string`] - Release a string returned by this library

pub mod auth;
pub mod blob_store;
pub mod config;
pub mod error;
pub mod filter;
pub mod local_db_model;
pub mod local_db_state;
pub mod query;
pub mod relations;
pub mod request;
pub mod seed;
pub mod write;
mod app_response;
mod test;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};

use crate::app_response::AppResponse;
use crate::config::BackendConfig;
use crate::local_db_state::LocalDb;
use crate::request::QueryRequest;

pub use crate::error::{ErrorSlot, StoreError};
pub use crate::filter::{Filter, OrClause};
pub use crate::query::{Direction, Query, QueryResult, SelectOptions, SingleResult};
pub use crate::write::{Mutation, WriteResult};

/// Opens the LMDB-backed store at `{path}.lmdb`.
///
/// The storage key comes from the environment (see [`BackendConfig`]).
///
/// # Returns
///
/// A pointer to the [`LocalDb`] instance, or null on failure. Release it with
/// [`close_client`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use wanderlust_store::create_client;
///
/// let path = CString::new("wanderlust_mock_db").unwrap();
/// let client = create_client(path.as_ptr());
/// assert!(!client.is_null());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_client(path: *const c_char) -> *mut LocalDb {
    if path.is_null() {
        warn!("Null path pointer passed to create_client");
        return std::ptr::null_mut();
    }

    let path_str = match unsafe { CStr::from_ptr(path).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in path parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    let config = BackendConfig::from_env();
    match LocalDb::init_at(path_str, config.storage_key) {
        Ok(db) => {
            info!("Client opened at {path_str}.lmdb");
            Box::into_raw(Box::new(db))
        }
        Err(e) => {
            warn!("Failed to open client at {path_str}.lmdb: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Runs one [`QueryRequest`] document against the store.
///
/// # Returns
///
/// A JSON-serialized [`AppResponse`]. On success the `Ok` payload is the
/// result envelope (`{ data, count, error }` for reads, `{ data, error }` for
/// writes). Release it with [`free_c_string`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use wanderlust_store::{create_client, execute_request};
///
/// let path = CString::new("wanderlust_mock_db").unwrap();
/// let client = create_client(path.as_ptr());
///
/// let request = CString::new(r#"{"table":"tours","range":{"from":0,"to":8}}"#).unwrap();
/// let response = execute_request(client, request.as_ptr());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn execute_request(client: *mut LocalDb, json_ptr: *const c_char) -> *const c_char {
    let client = match unsafe { client.as_ref() } {
        Some(c) => c,
        None => {
            let error = AppResponse::BadRequest("Null client pointer".to_string());
            return response_to_c_string(&error);
        }
    };

    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(err) => return err,
    };

    let request: QueryRequest = match serde_json::from_str(&json_str) {
        Ok(r) => r,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid request: {e}"));
            return response_to_c_string(&error);
        }
    };

    let response = match request.execute(client) {
        Ok(envelope) => AppResponse::success(envelope.to_string()),
        Err(e) => {
            let error = AppResponse::from(e);
            warn!("Request failed: {error}");
            error
        }
    };
    response_to_c_string(&response)
}

/// Clears the persisted blob and reseeds.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn reset_store(client: *mut LocalDb) -> *const c_char {
    let client = match unsafe { client.as_ref() } {
        Some(c) => c,
        None => {
            let error = AppResponse::BadRequest("Null client pointer passed to reset_store".to_string());
            return response_to_c_string(&error);
        }
    };

    client.reset();
    response_to_c_string(&AppResponse::success("Store was reset successfully"))
}

/// Whether the environment leaves the storefront on the local backend.
#[no_mangle]
pub extern "C" fn is_emulated() -> bool {
    BackendConfig::from_env().is_emulated()
}

/// Releases a client created by [`create_client`]. Null is ignored.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_client(client: *mut LocalDb) {
    if client.is_null() {
        return;
    }
    drop(unsafe { Box::from_raw(client) });
    info!("Client closed");
}

/// Releases a string returned by this library. Null is ignored.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_c_string(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(ptr as *mut c_char) });
}

/// Serializes `response` into a C string owned by the caller.
///
/// Returns null if serialization or C string creation fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a Rust `String`.
///
/// On failure the `Err` holds an already-serialized error response.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
