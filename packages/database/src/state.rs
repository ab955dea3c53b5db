//! Key-value document storage for the import state and country snapshot.
//!
//! The backing store supports only whole-document `get`/`put` — no
//! field-level patches, no transactions. Every mutation of the import
//! state round-trips the full document through
//! [`load_import_state`]/[`save_import_state`]. Concurrent batches racing
//! on that load-modify-save cycle are resolved last-write-wins; see the
//! note on [`save_import_state`].

use geonames_import_models::{CountryRecord, ImportState};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue};

use crate::DbError;

/// Document key for the singleton import state.
pub const IMPORT_STATE_KEY: &str = "geonames:import-state";

/// Document key for the country list snapshot.
pub const COUNTRY_SNAPSHOT_KEY: &str = "geonames:countries";

/// Reads a document by key.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn get_document(db: &dyn Database, key: &str) -> Result<Option<String>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT value FROM kv_documents WHERE key = $1",
            &[DatabaseValue::String(key.to_string())],
        )
        .await
        .map_err(|e| DbError::Database(e.to_string()))?;

    Ok(rows.first().and_then(|row| row.to_value("value").ok()))
}

/// Writes a document by key, replacing the previous value atomically.
///
/// # Errors
///
/// Returns [`DbError`] if the write fails.
pub async fn put_document(db: &dyn Database, key: &str, value: &str) -> Result<(), DbError> {
    db.exec_raw_params(
        "INSERT OR REPLACE INTO kv_documents (key, value) VALUES ($1, $2)",
        &[
            DatabaseValue::String(key.to_string()),
            DatabaseValue::String(value.to_string()),
        ],
    )
    .await
    .map_err(|e| DbError::Database(e.to_string()))?;

    Ok(())
}

/// Loads the import state document, if an import has ever been started.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or the stored document cannot
/// be decoded.
pub async fn load_import_state(db: &dyn Database) -> Result<Option<ImportState>, DbError> {
    let Some(json) = get_document(db, IMPORT_STATE_KEY).await? else {
        return Ok(None);
    };

    Ok(Some(serde_json::from_str(&json)?))
}

/// Saves the import state document, replacing the previous one.
///
/// Two concurrent batches that both loaded the same document will race
/// here; the later save wins and the loser's counter increments are
/// dropped. The store exposes no compare-and-swap, and the batch driver's
/// group/cooldown discipline keeps write pressure low enough that this is
/// an accepted tradeoff.
///
/// # Errors
///
/// Returns [`DbError`] if encoding or the write fails.
pub async fn save_import_state(db: &dyn Database, state: &ImportState) -> Result<(), DbError> {
    let json = serde_json::to_string(state)?;
    put_document(db, IMPORT_STATE_KEY, &json).await
}

/// Saves the full country list as a snapshot document, replacing any
/// prior snapshot.
///
/// # Errors
///
/// Returns [`DbError`] if encoding or the write fails.
pub async fn save_country_snapshot(
    db: &dyn Database,
    countries: &[CountryRecord],
) -> Result<(), DbError> {
    let json = serde_json::to_string(countries)?;
    put_document(db, COUNTRY_SNAPSHOT_KEY, &json).await
}

/// Loads the country list snapshot, if one has been imported.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or the stored document cannot
/// be decoded.
pub async fn load_country_snapshot(
    db: &dyn Database,
) -> Result<Option<Vec<CountryRecord>>, DbError> {
    let Some(json) = get_document(db, COUNTRY_SNAPSHOT_KEY).await? else {
        return Ok(None);
    };

    Ok(Some(serde_json::from_str(&json)?))
}
