//! Database connection utilities.

use std::path::Path;

use switchy_database::Database;
use switchy_database_connection::init_sqlite_rusqlite;

use crate::{DbError, queries};

/// Default path for the import database.
pub const DEFAULT_DB_PATH: &str = "data/geonames.db";

/// Opens the `SQLite` database at the path given by `GEONAMES_DB_PATH`
/// (falling back to [`DEFAULT_DB_PATH`]) and ensures the schema exists.
///
/// # Errors
///
/// Returns [`DbError`] if the database cannot be opened or schema
/// creation fails.
pub async fn open_from_env() -> Result<Box<dyn Database>, DbError> {
    let path = std::env::var("GEONAMES_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
    open_db(Path::new(&path)).await
}

/// Opens (or creates) the `SQLite` database at `path` and ensures the
/// schema exists.
///
/// # Errors
///
/// Returns [`DbError`] if the database cannot be opened or schema
/// creation fails.
pub async fn open_db(path: &Path) -> Result<Box<dyn Database>, DbError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db = init_sqlite_rusqlite(Some(path)).map_err(|e| DbError::Database(e.to_string()))?;

    queries::ensure_schema(db.as_ref()).await?;

    Ok(db)
}
