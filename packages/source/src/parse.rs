//! Positional parsers for the tab-delimited GeoNames dump formats.
//!
//! Both dump formats carry 19 tab-separated fields per data line. Fields
//! are addressed by position; empty fields map to `None`. A line that
//! cannot be parsed produces a [`ParseError`], a record-level error that
//! the batch processor collects without aborting the batch.

use geonames_import_models::{CityRecord, CountryRecord};

/// Number of tab-separated fields in a city dump line.
pub const CITY_FIELD_COUNT: usize = 19;

/// Errors from parsing a single dump line.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The line did not carry enough tab-separated fields.
    #[error("expected {expected} tab-separated fields, found {found}")]
    FieldCount {
        /// Number of fields the format requires.
        expected: usize,
        /// Number of fields found on the line.
        found: usize,
    },

    /// A field failed numeric coercion.
    #[error("invalid {field}: {message}")]
    Coerce {
        /// Name of the offending field.
        field: &'static str,
        /// Description of what went wrong.
        message: String,
    },
}

/// Parses one line of a city dump file.
///
/// The alternate-names column is only carried through when
/// `include_alternate_names` is set; otherwise it is dropped to keep the
/// stored rows small.
///
/// # Errors
///
/// Returns [`ParseError`] if the line has too few fields or a required
/// numeric field fails to coerce.
pub fn parse_city_line(line: &str, include_alternate_names: bool) -> Result<CityRecord, ParseError> {
    let fields: Vec<&str> = line.split('\t').collect();

    if fields.len() < CITY_FIELD_COUNT {
        return Err(ParseError::FieldCount {
            expected: CITY_FIELD_COUNT,
            found: fields.len(),
        });
    }

    Ok(CityRecord {
        geoname_id: required_i64(fields[0], "geoname_id")?,
        name: fields[1].to_string(),
        ascii_name: optional_text(fields[2]),
        alternate_names: if include_alternate_names {
            optional_text(fields[3])
        } else {
            None
        },
        latitude: required_f64(fields[4], "latitude")?,
        longitude: required_f64(fields[5], "longitude")?,
        feature_class: optional_text(fields[6]),
        feature_code: optional_text(fields[7]),
        country_code: fields[8].to_string(),
        cc2: optional_text(fields[9]),
        admin1_code: optional_text(fields[10]),
        admin2_code: optional_text(fields[11]),
        admin3_code: optional_text(fields[12]),
        admin4_code: optional_text(fields[13]),
        population: required_i64(fields[14], "population")?,
        elevation: optional_i64(fields[15]),
        dem: optional_i64(fields[16]),
        timezone: optional_text(fields[17]),
        modified_at: optional_text(fields[18]),
    })
}

/// Minimum field count of a country line: everything through the geoname
/// identifier. Rows occasionally omit the trailing neighbours and
/// equivalent-FIPS columns.
const COUNTRY_MIN_FIELD_COUNT: usize = 17;

/// Parses one data line of `countryInfo.txt`.
///
/// # Errors
///
/// Returns [`ParseError`] if the line has too few fields or a required
/// numeric field fails to coerce.
pub fn parse_country_line(line: &str) -> Result<CountryRecord, ParseError> {
    let fields: Vec<&str> = line.split('\t').collect();

    if fields.len() < COUNTRY_MIN_FIELD_COUNT {
        return Err(ParseError::FieldCount {
            expected: COUNTRY_MIN_FIELD_COUNT,
            found: fields.len(),
        });
    }

    Ok(CountryRecord {
        iso: fields[0].to_string(),
        iso3: fields[1].to_string(),
        iso_numeric: fields[2].to_string(),
        fips: optional_text(fields[3]),
        name: fields[4].to_string(),
        capital: optional_text(fields[5]),
        area_sq_km: optional_f64(fields[6]),
        population: required_i64(fields[7], "population")?,
        continent: fields[8].to_string(),
        tld: optional_text(fields[9]),
        currency_code: optional_text(fields[10]),
        currency_name: optional_text(fields[11]),
        phone: optional_text(fields[12]),
        postal_code_format: optional_text(fields[13]),
        postal_code_regex: optional_text(fields[14]),
        languages: optional_text(fields[15]),
        geoname_id: required_i64(fields[16], "geoname_id")?,
        neighbours: optional_text(fields.get(17).copied().unwrap_or_default()),
        equivalent_fips_code: optional_text(fields.get(18).copied().unwrap_or_default()),
    })
}

/// Parses the full country file, skipping `#` comment lines and blank
/// lines. Unparseable data lines are logged and dropped; the country
/// list is a best-effort snapshot, and one malformed row should not
/// abort an import initialization.
#[must_use]
pub fn parse_country_file(text: &str) -> Vec<CountryRecord> {
    let mut countries = Vec::new();

    for line in text.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match parse_country_line(line) {
            Ok(country) => countries.push(country),
            Err(e) => log::warn!("Skipping unparseable country line: {e}"),
        }
    }

    countries
}

fn optional_text(field: &str) -> Option<String> {
    if field.is_empty() {
        None
    } else {
        Some(field.to_string())
    }
}

fn required_i64(field: &str, name: &'static str) -> Result<i64, ParseError> {
    field.parse().map_err(|_| ParseError::Coerce {
        field: name,
        message: format!("'{field}' is not an integer"),
    })
}

fn required_f64(field: &str, name: &'static str) -> Result<f64, ParseError> {
    field.parse().map_err(|_| ParseError::Coerce {
        field: name,
        message: format!("'{field}' is not a number"),
    })
}

fn optional_i64(field: &str) -> Option<i64> {
    field.parse().ok()
}

fn optional_f64(field: &str) -> Option<f64> {
    field.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABERDEEN: &str = "2657832\tAberdeen\tAberdeen\tAberdein,Abirdin\t57.14369\t-2.09814\tP\tPPLA2\tGB\t\tSCT\tABE\t\t\t189120\t\t65\tEurope/London\t2022-03-09";

    const UK: &str = "GB\tGBR\t826\tUK\tUnited Kingdom\tLondon\t244820\t66488991\tEU\t.uk\tGBP\tPound\t44\t@# #@@|@## #@@\t^(...)$\ten-GB,cy-GB,gd\t2635167\tIE\t";

    #[test]
    fn parses_city_line() {
        let city = parse_city_line(ABERDEEN, false).unwrap();
        assert_eq!(city.geoname_id, 2_657_832);
        assert_eq!(city.name, "Aberdeen");
        assert!((city.latitude - 57.14369).abs() < 1e-9);
        assert!((city.longitude - -2.09814).abs() < 1e-9);
        assert_eq!(city.country_code, "GB");
        assert_eq!(city.population, 189_120);
        assert_eq!(city.elevation, None);
        assert_eq!(city.dem, Some(65));
        assert_eq!(city.timezone.as_deref(), Some("Europe/London"));
        assert_eq!(city.cc2, None);
    }

    #[test]
    fn alternate_names_dropped_unless_requested() {
        let without = parse_city_line(ABERDEEN, false).unwrap();
        assert_eq!(without.alternate_names, None);

        let with = parse_city_line(ABERDEEN, true).unwrap();
        assert_eq!(with.alternate_names.as_deref(), Some("Aberdein,Abirdin"));
    }

    #[test]
    fn city_line_with_too_few_fields_is_rejected() {
        let err = parse_city_line("2657832\tAberdeen", false).unwrap_err();
        assert!(matches!(
            err,
            ParseError::FieldCount {
                expected: CITY_FIELD_COUNT,
                found: 2
            }
        ));
    }

    #[test]
    fn non_numeric_population_is_rejected() {
        let line = ABERDEEN.replace("189120", "many");
        let err = parse_city_line(&line, false).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Coerce {
                field: "population",
                ..
            }
        ));
    }

    #[test]
    fn parses_country_line() {
        let country = parse_country_line(UK).unwrap();
        assert_eq!(country.iso, "GB");
        assert_eq!(country.iso3, "GBR");
        assert_eq!(country.iso_numeric, "826");
        assert_eq!(country.name, "United Kingdom");
        assert_eq!(country.capital.as_deref(), Some("London"));
        assert_eq!(country.population, 66_488_991);
        assert_eq!(country.geoname_id, 2_635_167);
        assert_eq!(country.neighbours.as_deref(), Some("IE"));
        assert_eq!(country.equivalent_fips_code, None);
    }

    #[test]
    fn country_file_skips_comments_and_bad_lines() {
        let text = format!("# GeoNames country info\n#\n{UK}\nXX\tbroken\n\n");
        let countries = parse_country_file(&text);
        assert_eq!(countries.len(), 1);
        assert_eq!(countries[0].iso, "GB");
    }
}
