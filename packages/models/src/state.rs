//! The persisted import-state document and its transitions.
//!
//! One [`ImportState`] document exists per import lineage. Every batch
//! invocation loads it, folds its outcome in through the methods below,
//! and saves the whole document back. The transitions are pure so the
//! state machine tests without any storage behind it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::dataset::CityFile;

/// Progress status of an import lineage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ImportStatus {
    /// No batch has run yet.
    NotStarted,
    /// At least one batch has run; the window has not reached the end.
    InProgress,
    /// All lines processed with no failed offsets remaining.
    Completed,
    /// Terminal with failed offsets remaining, or aborted by a fatal error.
    Failed,
}

/// Options for a single batch invocation, as accepted by the import entry
/// point. Unspecified fields take the documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchOptions {
    /// Minimum population a city must have to be persisted. Also selects
    /// which dump file is fetched.
    pub city_population_threshold: u64,
    /// Whether to store the alternate-names column.
    pub include_alternate_names: bool,
    /// Zero-based line offset of the batch window.
    pub offset: u64,
    /// Number of lines in the batch window.
    pub limit: u64,
    /// Discard all prior city rows and state before processing.
    pub clean_start: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            city_population_threshold: 15_000,
            include_alternate_names: false,
            offset: 0,
            limit: 50,
            clean_start: false,
        }
    }
}

impl BatchOptions {
    /// The subset of these options recorded on the state document.
    #[must_use]
    pub const fn persisted(&self) -> ImportOptions {
        ImportOptions {
            city_population_threshold: self.city_population_threshold,
            include_alternate_names: self.include_alternate_names,
            offset: self.offset,
            limit: self.limit,
        }
    }
}

/// The last-used options recorded on the state document. `cleanStart` is
/// an invocation flag, not part of the lineage, so it is not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    /// Minimum population a city must have to be persisted.
    pub city_population_threshold: u64,
    /// Whether the alternate-names column is stored.
    pub include_alternate_names: bool,
    /// Offset of the most recent batch.
    pub offset: u64,
    /// Limit of the most recent batch.
    pub limit: u64,
}

/// Progress of the current (or most recent) import lineage.
///
/// Exactly one document exists at a time; a clean start replaces it
/// entirely. Counters are monotonically increasing across the lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportState {
    /// Lineage status.
    pub status: ImportStatus,
    /// Dump file selected when the lineage started.
    pub city_file_name: String,
    /// Lines processed so far, including lines skipped by the population
    /// filter.
    pub processed_lines: u64,
    /// Cities written so far.
    pub processed_cities: u64,
    /// Lines skipped by the population filter so far.
    pub skipped_cities: u64,
    /// Total line count of the dump file. Set by the first batch that
    /// parses the full dataset; never recomputed afterwards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_lines: Option<u64>,
    /// Offsets whose batch raised at least one record-level error,
    /// awaiting retry. An offset appears at most once.
    pub failed_offsets: Vec<u64>,
    /// Error messages from the most recent batch (overwritten each batch).
    pub errors: Vec<String>,
    /// Options used by the most recent batch.
    pub options: ImportOptions,
    /// When the lineage started.
    pub started_at: DateTime<Utc>,
    /// When the state was last written.
    pub last_updated_at: DateTime<Utc>,
    /// When the lineage reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Fatal error message, when a batch invocation aborted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImportState {
    /// Creates the state document for a new lineage.
    #[must_use]
    pub fn fresh(options: &BatchOptions, city_file: CityFile, now: DateTime<Utc>) -> Self {
        Self {
            status: ImportStatus::InProgress,
            city_file_name: city_file.to_string(),
            processed_lines: 0,
            processed_cities: 0,
            skipped_cities: 0,
            total_lines: None,
            failed_offsets: Vec::new(),
            errors: Vec::new(),
            options: options.persisted(),
            started_at: now,
            last_updated_at: now,
            completed_at: None,
            error: None,
        }
    }

    /// Reuses this lineage for another batch, overlaying the newly
    /// supplied options. A previously recorded fatal error is cleared; a
    /// lineage that already reached a terminal status keeps it until
    /// [`Self::finalize_if_complete`] re-evaluates.
    pub fn resume(&mut self, options: &BatchOptions) {
        self.options = options.persisted();
        if self.completed_at.is_none() {
            self.status = ImportStatus::InProgress;
            self.error = None;
        }
    }

    /// Records the dataset's total line count, once per lineage.
    pub fn record_total_lines(&mut self, total: u64) {
        if self.total_lines.is_none() {
            self.total_lines = Some(total);
        }
    }

    /// Folds one batch outcome into the lineage counters.
    ///
    /// A batch with no record-level errors removes its offset from the
    /// failed list (retry convergence); a batch with errors appends it.
    /// The error list always reflects the most recent batch.
    pub fn apply_batch(
        &mut self,
        offset: u64,
        lines_processed: u64,
        cities_imported: u64,
        cities_skipped: u64,
        errors: Vec<String>,
        now: DateTime<Utc>,
    ) {
        self.processed_lines += lines_processed;
        self.processed_cities += cities_imported;
        self.skipped_cities += cities_skipped;

        if errors.is_empty() {
            self.failed_offsets.retain(|&o| o != offset);
        } else if !self.failed_offsets.contains(&offset) {
            self.failed_offsets.push(offset);
        }

        self.errors = errors;
        self.last_updated_at = now;
    }

    /// Re-evaluates the terminal status after a batch.
    ///
    /// The lineage becomes terminal when the batch window reaches the end
    /// of the dataset. A lineage that is already terminal is re-evaluated
    /// on every batch, so a successful retry of a failed offset can move
    /// the status from failed to completed.
    pub fn finalize_if_complete(&mut self, offset: u64, limit: u64, now: DateTime<Utc>) {
        let Some(total) = self.total_lines else {
            return;
        };

        if offset.saturating_add(limit) >= total || self.completed_at.is_some() {
            self.status = if self.failed_offsets.is_empty() {
                ImportStatus::Completed
            } else {
                ImportStatus::Failed
            };
            self.completed_at = Some(now);
        }
    }

    /// Marks the lineage failed with a fatal error message.
    pub fn mark_fatal(&mut self, message: String, now: DateTime<Utc>) {
        self.status = ImportStatus::Failed;
        self.error = Some(message);
        self.last_updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn state_with_total(total: u64) -> ImportState {
        let mut state = ImportState::fresh(&BatchOptions::default(), CityFile::Cities15000, t0());
        state.record_total_lines(total);
        state
    }

    #[test]
    fn default_options_match_documented_defaults() {
        let options = BatchOptions::default();
        assert_eq!(options.city_population_threshold, 15_000);
        assert!(!options.include_alternate_names);
        assert_eq!(options.offset, 0);
        assert_eq!(options.limit, 50);
        assert!(!options.clean_start);
    }

    #[test]
    fn total_lines_is_set_once() {
        let mut state = state_with_total(130);
        state.record_total_lines(999);
        assert_eq!(state.total_lines, Some(130));
    }

    #[test]
    fn successful_batches_advance_counters() {
        let mut state = state_with_total(130);
        state.apply_batch(0, 50, 35, 15, Vec::new(), t0());
        state.apply_batch(50, 50, 40, 10, Vec::new(), t0());
        assert_eq!(state.processed_lines, 100);
        assert_eq!(state.processed_cities, 75);
        assert_eq!(state.skipped_cities, 25);
        assert!(state.failed_offsets.is_empty());
        assert_eq!(state.status, ImportStatus::InProgress);
    }

    #[test]
    fn batch_errors_record_failed_offset_without_duplicates() {
        let mut state = state_with_total(130);
        state.apply_batch(50, 50, 48, 0, vec!["geoname 7: bad row".into()], t0());
        state.apply_batch(50, 50, 48, 0, vec!["geoname 7: bad row".into()], t0());
        assert_eq!(state.failed_offsets, vec![50]);
        assert_eq!(state.errors.len(), 1);
    }

    #[test]
    fn errors_reflect_most_recent_batch_only() {
        let mut state = state_with_total(130);
        state.apply_batch(0, 50, 49, 0, vec!["geoname 1: bad row".into()], t0());
        state.apply_batch(50, 50, 50, 0, Vec::new(), t0());
        assert!(state.errors.is_empty());
        assert_eq!(state.failed_offsets, vec![0]);
    }

    #[test]
    fn terminal_batch_completes_clean_lineage() {
        let mut state = state_with_total(130);
        state.apply_batch(100, 30, 30, 0, Vec::new(), t0());
        state.finalize_if_complete(100, 50, t0());
        assert_eq!(state.status, ImportStatus::Completed);
        assert!(state.completed_at.is_some());
    }

    #[test]
    fn terminal_batch_fails_lineage_with_failed_offsets() {
        let mut state = state_with_total(130);
        state.apply_batch(0, 50, 49, 0, vec!["geoname 3: bad row".into()], t0());
        state.apply_batch(100, 30, 30, 0, Vec::new(), t0());
        state.finalize_if_complete(100, 50, t0());
        assert_eq!(state.status, ImportStatus::Failed);
    }

    #[test]
    fn mid_window_batch_is_not_terminal() {
        let mut state = state_with_total(130);
        state.apply_batch(50, 50, 50, 0, Vec::new(), t0());
        state.finalize_if_complete(50, 50, t0());
        assert_eq!(state.status, ImportStatus::InProgress);
        assert!(state.completed_at.is_none());
    }

    #[test]
    fn retry_of_failed_offset_converges_to_completed() {
        let mut state = state_with_total(130);
        state.apply_batch(50, 50, 49, 0, vec!["geoname 9: bad row".into()], t0());
        state.apply_batch(100, 30, 30, 0, Vec::new(), t0());
        state.finalize_if_complete(100, 50, t0());
        assert_eq!(state.status, ImportStatus::Failed);

        // Retry the failed offset; the lineage is already terminal, so the
        // re-evaluation flips it to completed.
        state.resume(&BatchOptions {
            offset: 50,
            ..BatchOptions::default()
        });
        state.apply_batch(50, 50, 50, 0, Vec::new(), t0());
        state.finalize_if_complete(50, 50, t0());
        assert!(state.failed_offsets.is_empty());
        assert_eq!(state.status, ImportStatus::Completed);
    }

    #[test]
    fn resume_clears_fatal_error() {
        let mut state = state_with_total(130);
        state.mark_fatal("remote file unreachable".into(), t0());
        assert_eq!(state.status, ImportStatus::Failed);

        state.resume(&BatchOptions::default());
        assert_eq!(state.status, ImportStatus::InProgress);
        assert!(state.error.is_none());
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let state = state_with_total(130);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["cityFileName"], "cities15000");
        assert_eq!(json["processedLines"], 0);
        assert_eq!(json["totalLines"], 130);
        assert_eq!(json["options"]["cityPopulationThreshold"], 15_000);
        assert!(json.get("completedAt").is_none());
    }

    #[test]
    fn batch_options_deserialize_with_defaults() {
        let options: BatchOptions = serde_json::from_str(r#"{"offset": 100}"#).unwrap();
        assert_eq!(options.offset, 100);
        assert_eq!(options.limit, 50);
        assert_eq!(options.city_population_threshold, 15_000);
        assert!(!options.clean_start);
    }
}
