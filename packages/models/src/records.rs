//! Country and city record shapes.
//!
//! These mirror the tab-delimited column layout of the GeoNames dump
//! files. They are distinct from any API response types; the database
//! crate stores them column-for-column.

use serde::{Deserialize, Serialize};

/// A country row from `countryInfo.txt`.
///
/// Keyed by the numeric geoname identifier (primary key); the two-letter
/// ISO code is unique. The full set is replaced on every import
/// initialization and additionally snapshotted into the key-value store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryRecord {
    /// Numeric geoname identifier (primary key).
    pub geoname_id: i64,
    /// Two-letter ISO 3166-1 code (unique).
    pub iso: String,
    /// Three-letter ISO 3166-1 code.
    pub iso3: String,
    /// Three-digit ISO 3166-1 numeric code (kept as text, zero-padded).
    pub iso_numeric: String,
    /// FIPS country code.
    pub fips: Option<String>,
    /// Country name.
    pub name: String,
    /// Capital city name.
    pub capital: Option<String>,
    /// Surface area in square kilometers.
    pub area_sq_km: Option<f64>,
    /// Total population.
    pub population: i64,
    /// Two-letter continent code.
    pub continent: String,
    /// Top-level internet domain.
    pub tld: Option<String>,
    /// ISO 4217 currency code.
    pub currency_code: Option<String>,
    /// Currency name.
    pub currency_name: Option<String>,
    /// International phone prefix.
    pub phone: Option<String>,
    /// Postal code format mask.
    pub postal_code_format: Option<String>,
    /// Postal code validation regex.
    pub postal_code_regex: Option<String>,
    /// Comma-separated spoken language codes.
    pub languages: Option<String>,
    /// Comma-separated ISO codes of neighbouring countries.
    pub neighbours: Option<String>,
    /// Equivalent FIPS code, where one exists.
    pub equivalent_fips_code: Option<String>,
}

/// A city row from one of the city dump files.
///
/// Keyed by the numeric geoname identifier, stable across re-imports, so
/// repeated writes of the same record are idempotent insert-or-replace
/// operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityRecord {
    /// Numeric geoname identifier (primary key).
    pub geoname_id: i64,
    /// City name (UTF-8).
    pub name: String,
    /// Name in plain ASCII characters.
    pub ascii_name: Option<String>,
    /// Comma-separated alternate names; `None` unless the import was
    /// requested with `includeAlternateNames`.
    pub alternate_names: Option<String>,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Feature class (`P` for populated places).
    pub feature_class: Option<String>,
    /// Feature code within the class.
    pub feature_code: Option<String>,
    /// Two-letter ISO country code.
    pub country_code: String,
    /// Alternate country codes.
    pub cc2: Option<String>,
    /// First-level administrative division code.
    pub admin1_code: Option<String>,
    /// Second-level administrative division code.
    pub admin2_code: Option<String>,
    /// Third-level administrative division code.
    pub admin3_code: Option<String>,
    /// Fourth-level administrative division code.
    pub admin4_code: Option<String>,
    /// Population count.
    pub population: i64,
    /// Elevation in meters.
    pub elevation: Option<i64>,
    /// Digital elevation model value in meters.
    pub dem: Option<i64>,
    /// IANA timezone identifier.
    pub timezone: Option<String>,
    /// Date of last modification in the source dataset (`YYYY-MM-DD`).
    pub modified_at: Option<String>,
}
