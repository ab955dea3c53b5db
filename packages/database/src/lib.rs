#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! SQLite storage for the GeoNames import.
//!
//! Uses `switchy_database` for all database operations: `exec_raw` for
//! schema statements, `exec_raw_params` for writes, and
//! `query_raw_params` with `ToValue` for reads. Countries and cities live
//! in relational tables; the import state and the country snapshot live
//! as whole JSON documents in the `kv_documents` table (see [`state`]).

pub mod db;
pub mod queries;
pub mod state;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A database query or command failed.
    #[error("Database error: {0}")]
    Database(String),

    /// An I/O operation failed (e.g., creating the database file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization of a stored document failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
