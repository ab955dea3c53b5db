//! Relational queries for country and city rows.
//!
//! City writes are insert-or-replace keyed on the geoname identifier, so
//! re-running a batch overwrites the same rows instead of failing on
//! duplicate keys. Countries are fully replaced on every import
//! initialization.

use geonames_import_models::{CityRecord, CountryRecord};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue};

use crate::DbError;

/// Creates all tables and indexes if they don't already exist.
///
/// # Errors
///
/// Returns [`DbError`] if any schema statement fails.
pub async fn ensure_schema(db: &dyn Database) -> Result<(), DbError> {
    db.exec_raw(
        "CREATE TABLE IF NOT EXISTS countries (
            geoname_id           INTEGER PRIMARY KEY,
            iso                  TEXT NOT NULL UNIQUE,
            iso3                 TEXT NOT NULL,
            iso_numeric          TEXT NOT NULL,
            fips                 TEXT,
            name                 TEXT NOT NULL,
            capital              TEXT,
            area_sq_km           REAL,
            population           INTEGER NOT NULL,
            continent            TEXT NOT NULL,
            tld                  TEXT,
            currency_code        TEXT,
            currency_name        TEXT,
            phone                TEXT,
            postal_code_format   TEXT,
            postal_code_regex    TEXT,
            languages            TEXT,
            neighbours           TEXT,
            equivalent_fips_code TEXT
        )",
    )
    .await
    .map_err(|e| DbError::Database(e.to_string()))?;

    db.exec_raw(
        "CREATE TABLE IF NOT EXISTS cities (
            geoname_id      INTEGER PRIMARY KEY,
            name            TEXT NOT NULL,
            ascii_name      TEXT,
            alternate_names TEXT,
            latitude        REAL NOT NULL,
            longitude       REAL NOT NULL,
            feature_class   TEXT,
            feature_code    TEXT,
            country_code    TEXT NOT NULL,
            cc2             TEXT,
            admin1_code     TEXT,
            admin2_code     TEXT,
            admin3_code     TEXT,
            admin4_code     TEXT,
            population      INTEGER NOT NULL,
            elevation       INTEGER,
            dem             INTEGER,
            timezone        TEXT,
            modified_at     TEXT
        )",
    )
    .await
    .map_err(|e| DbError::Database(e.to_string()))?;

    db.exec_raw("CREATE INDEX IF NOT EXISTS idx_cities_country_code ON cities(country_code)")
        .await
        .map_err(|e| DbError::Database(e.to_string()))?;

    db.exec_raw("CREATE INDEX IF NOT EXISTS idx_cities_name ON cities(name)")
        .await
        .map_err(|e| DbError::Database(e.to_string()))?;

    db.exec_raw("CREATE INDEX IF NOT EXISTS idx_cities_population ON cities(population)")
        .await
        .map_err(|e| DbError::Database(e.to_string()))?;

    db.exec_raw(
        "CREATE TABLE IF NOT EXISTS kv_documents (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    )
    .await
    .map_err(|e| DbError::Database(e.to_string()))?;

    Ok(())
}

/// Deletes all city rows and re-creates the schema and indexes, for a
/// clean import start.
///
/// # Errors
///
/// Returns [`DbError`] if the delete or any schema statement fails.
pub async fn reset_cities(db: &dyn Database) -> Result<(), DbError> {
    ensure_schema(db).await?;

    db.exec_raw("DELETE FROM cities")
        .await
        .map_err(|e| DbError::Database(e.to_string()))?;

    log::info!("Cleared city table for clean import start");

    Ok(())
}

/// Inserts or replaces a single city row, keyed on the geoname
/// identifier.
///
/// # Errors
///
/// Returns [`DbError`] if the write fails.
pub async fn upsert_city(db: &dyn Database, city: &CityRecord) -> Result<(), DbError> {
    db.exec_raw_params(
        "INSERT OR REPLACE INTO cities (
            geoname_id, name, ascii_name, alternate_names, latitude,
            longitude, feature_class, feature_code, country_code, cc2,
            admin1_code, admin2_code, admin3_code, admin4_code, population,
            elevation, dem, timezone, modified_at
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
            $11, $12, $13, $14, $15, $16, $17, $18, $19
        )",
        &[
            DatabaseValue::Int64(city.geoname_id),
            DatabaseValue::String(city.name.clone()),
            opt_text(city.ascii_name.as_ref()),
            opt_text(city.alternate_names.as_ref()),
            DatabaseValue::Real64(city.latitude),
            DatabaseValue::Real64(city.longitude),
            opt_text(city.feature_class.as_ref()),
            opt_text(city.feature_code.as_ref()),
            DatabaseValue::String(city.country_code.clone()),
            opt_text(city.cc2.as_ref()),
            opt_text(city.admin1_code.as_ref()),
            opt_text(city.admin2_code.as_ref()),
            opt_text(city.admin3_code.as_ref()),
            opt_text(city.admin4_code.as_ref()),
            DatabaseValue::Int64(city.population),
            opt_int(city.elevation),
            opt_int(city.dem),
            opt_text(city.timezone.as_ref()),
            opt_text(city.modified_at.as_ref()),
        ],
    )
    .await
    .map_err(|e| DbError::Database(e.to_string()))?;

    Ok(())
}

/// Replaces the entire country table with the given set: delete-all, then
/// insert every record.
///
/// # Errors
///
/// Returns [`DbError`] if the delete or any insert fails.
pub async fn replace_countries(db: &dyn Database, countries: &[CountryRecord]) -> Result<(), DbError> {
    db.exec_raw("DELETE FROM countries")
        .await
        .map_err(|e| DbError::Database(e.to_string()))?;

    for country in countries {
        db.exec_raw_params(
            "INSERT INTO countries (
                geoname_id, iso, iso3, iso_numeric, fips, name, capital,
                area_sq_km, population, continent, tld, currency_code,
                currency_name, phone, postal_code_format, postal_code_regex,
                languages, neighbours, equivalent_fips_code
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19
            )",
            &[
                DatabaseValue::Int64(country.geoname_id),
                DatabaseValue::String(country.iso.clone()),
                DatabaseValue::String(country.iso3.clone()),
                DatabaseValue::String(country.iso_numeric.clone()),
                opt_text(country.fips.as_ref()),
                DatabaseValue::String(country.name.clone()),
                opt_text(country.capital.as_ref()),
                country
                    .area_sq_km
                    .map_or(DatabaseValue::Null, DatabaseValue::Real64),
                DatabaseValue::Int64(country.population),
                DatabaseValue::String(country.continent.clone()),
                opt_text(country.tld.as_ref()),
                opt_text(country.currency_code.as_ref()),
                opt_text(country.currency_name.as_ref()),
                opt_text(country.phone.as_ref()),
                opt_text(country.postal_code_format.as_ref()),
                opt_text(country.postal_code_regex.as_ref()),
                opt_text(country.languages.as_ref()),
                opt_text(country.neighbours.as_ref()),
                opt_text(country.equivalent_fips_code.as_ref()),
            ],
        )
        .await
        .map_err(|e| DbError::Database(e.to_string()))?;
    }

    Ok(())
}

/// Returns the number of city rows currently stored.
///
/// # Errors
///
/// Returns [`DbError`] if the count query fails.
pub async fn count_cities(db: &dyn Database) -> Result<i64, DbError> {
    let rows = db
        .query_raw_params("SELECT COUNT(*) as cnt FROM cities", &[])
        .await
        .map_err(|e| DbError::Database(e.to_string()))?;

    Ok(rows
        .first()
        .and_then(|row| row.to_value("cnt").ok())
        .unwrap_or(0))
}

fn opt_text(value: Option<&String>) -> DatabaseValue {
    value.map_or(DatabaseValue::Null, |s| DatabaseValue::String(s.clone()))
}

fn opt_int(value: Option<i64>) -> DatabaseValue {
    value.map_or(DatabaseValue::Null, DatabaseValue::Int64)
}
