#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the GeoNames import pipeline.
//!
//! Defines the country and city record shapes, the dataset-file selection
//! logic, the batch options accepted by the import entry point, and the
//! persisted [`state::ImportState`] document with its pure state
//! transitions. No I/O lives here; the database and source crates consume
//! these types.

pub mod dataset;
pub mod records;
pub mod state;

pub use dataset::CityFile;
pub use records::{CityRecord, CountryRecord};
pub use state::{BatchOptions, ImportOptions, ImportState, ImportStatus};
