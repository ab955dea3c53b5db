//! City dataset file selection.
//!
//! GeoNames publishes the city dump pre-filtered at several population
//! cutoffs. Importing with a high population threshold can use a much
//! smaller archive, but the selected file must stay consistent with the
//! population filter applied while processing.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A city dump variant on the GeoNames export server.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum CityFile {
    /// Cities with population >= 15,000.
    #[serde(rename = "cities15000")]
    #[strum(serialize = "cities15000")]
    Cities15000,
    /// Cities with population >= 5,000.
    #[serde(rename = "cities5000")]
    #[strum(serialize = "cities5000")]
    Cities5000,
    /// Cities with population >= 1,000.
    #[serde(rename = "cities1000")]
    #[strum(serialize = "cities1000")]
    Cities1000,
    /// The full unfiltered dataset.
    #[serde(rename = "allCountries")]
    #[strum(serialize = "allCountries")]
    AllCountries,
}

/// Population breakpoints mapping a threshold to the smallest sufficient
/// dump file, checked in descending order.
const THRESHOLD_BREAKPOINTS: &[(u64, CityFile)] = &[
    (15_000, CityFile::Cities15000),
    (5_000, CityFile::Cities5000),
    (1_000, CityFile::Cities1000),
];

impl CityFile {
    /// Selects the smallest dump file whose cutoff does not exceed the
    /// given population threshold.
    #[must_use]
    pub fn for_population_threshold(threshold: u64) -> Self {
        THRESHOLD_BREAKPOINTS
            .iter()
            .find(|(cutoff, _)| threshold >= *cutoff)
            .map_or(Self::AllCountries, |(_, file)| *file)
    }

    /// Name of the zip archive for this file on the export server.
    #[must_use]
    pub fn archive_name(self) -> String {
        format!("{self}.zip")
    }

    /// Name of the text file inside the archive.
    #[must_use]
    pub fn member_name(self) -> String {
        format!("{self}.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_by_threshold_breakpoints() {
        assert_eq!(
            CityFile::for_population_threshold(50_000),
            CityFile::Cities15000
        );
        assert_eq!(
            CityFile::for_population_threshold(15_000),
            CityFile::Cities15000
        );
        assert_eq!(
            CityFile::for_population_threshold(14_999),
            CityFile::Cities5000
        );
        assert_eq!(
            CityFile::for_population_threshold(5_000),
            CityFile::Cities5000
        );
        assert_eq!(
            CityFile::for_population_threshold(1_000),
            CityFile::Cities1000
        );
        assert_eq!(
            CityFile::for_population_threshold(999),
            CityFile::AllCountries
        );
        assert_eq!(CityFile::for_population_threshold(0), CityFile::AllCountries);
    }

    #[test]
    fn file_names_follow_export_server_layout() {
        assert_eq!(CityFile::Cities15000.to_string(), "cities15000");
        assert_eq!(CityFile::Cities15000.archive_name(), "cities15000.zip");
        assert_eq!(CityFile::AllCountries.member_name(), "allCountries.txt");
    }

    #[test]
    fn parses_from_stored_name() {
        assert_eq!(
            "cities5000".parse::<CityFile>().unwrap(),
            CityFile::Cities5000
        );
        assert!("cities500".parse::<CityFile>().is_err());
    }
}
