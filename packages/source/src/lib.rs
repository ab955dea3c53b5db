#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! GeoNames dataset fetching and parsing.
//!
//! The [`fetch::DatasetFetcher`] trait defines how the decompressed text
//! of the country and city files is obtained; the HTTP implementation
//! downloads from the GeoNames export server with retry and unzips the
//! city archives in memory. [`parse`] turns individual tab-delimited
//! lines into typed records.

pub mod fetch;
pub mod parse;
pub mod retry;

pub use fetch::{DatasetFetcher, HttpDatasetFetcher};

/// Errors that can occur while fetching a dataset file.
///
/// All of these are fatal to the batch invocation that raised them;
/// per-line parse failures are [`parse::ParseError`] and are handled as
/// record-level errors instead.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote server answered with a non-success status.
    #[error("Fetch failed: {message}")]
    Fetch {
        /// Description of what went wrong.
        message: String,
    },

    /// The downloaded archive was unreadable or missing the expected
    /// member file.
    #[error("Archive error: {message}")]
    Archive {
        /// Description of what went wrong.
        message: String,
    },

    /// I/O error while reading decompressed data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
