#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Resumable batch import of the GeoNames dataset.
//!
//! One [`run_batch`] invocation processes the window
//! `[offset, offset + limit)` of the selected city file: it resolves the
//! persisted import state, fetches and parses the full dataset, upserts
//! the window's records, and folds the outcome back into the state
//! document. Batches are independent: the driver dispatches them over
//! HTTP in any order and retries failed offsets, so all coordination
//! happens through the state document and the relational store.

use std::time::Instant;

use chrono::Utc;
use geonames_import_database::{DbError, queries, state};
use geonames_import_models::{BatchOptions, CityFile, CityRecord, ImportState, ImportStatus};
use geonames_import_source::parse::{parse_city_line, parse_country_file};
use geonames_import_source::{DatasetFetcher, SourceError};
use serde::Serialize;
use switchy_database::Database;

/// Maximum accepted batch size.
pub const MAX_LIMIT: u64 = 1000;

/// Errors that abort a batch invocation.
///
/// Record-level failures (a single line that fails to parse or write) are
/// not represented here — they are collected as messages on the
/// [`BatchSummary`] and the batch keeps going.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The supplied options were rejected before any batch work began.
    #[error("invalid options: {message}")]
    Validation {
        /// Description of what was rejected.
        message: String,
    },

    /// Fetching or decompressing a dataset file failed.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// A database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

/// Result of one batch invocation.
///
/// `errors` carries the batch's record-level failures; a non-empty list
/// means the offset was recorded for retry, but the batch itself still
/// ran to completion. A batch that could not run at all surfaces as an
/// [`ImportError`] instead.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Lineage status after this batch.
    pub status: ImportStatus,
    /// Dump file the lineage is importing.
    pub city_file_name: String,
    /// Offset of this batch's window.
    pub offset: u64,
    /// Limit of this batch's window.
    pub limit: u64,
    /// Total line count of the dump file.
    pub total_lines: u64,
    /// Lines processed by this batch, including filtered-out lines.
    pub lines_processed: u64,
    /// Cities written by this batch.
    pub cities_imported: u64,
    /// Lines skipped by the population filter in this batch.
    pub cities_skipped: u64,
    /// Record-level error messages from this batch.
    pub errors: Vec<String>,
}

/// Runs one import batch.
///
/// Validates the options synchronously, then fetches the dataset,
/// processes the batch window, and persists the updated import state. On
/// a fatal error the state is marked failed (best effort) before the
/// error propagates to the caller.
///
/// # Errors
///
/// Returns [`ImportError`] if the options are invalid or the batch could
/// not run (fetch, archive, or database failure).
pub async fn run_batch(
    db: &dyn Database,
    fetcher: &dyn DatasetFetcher,
    options: &BatchOptions,
) -> Result<BatchSummary, ImportError> {
    validate_options(options)?;

    let selected = CityFile::for_population_threshold(options.city_population_threshold);

    match run_batch_inner(db, fetcher, options, selected).await {
        Ok(summary) => Ok(summary),
        Err(e) => {
            persist_fatal(db, options, selected, &e.to_string()).await;
            Err(e)
        }
    }
}

/// Reads the current import state, if an import has ever been started.
///
/// # Errors
///
/// Returns [`ImportError`] if the state document cannot be read.
pub async fn get_import_state(db: &dyn Database) -> Result<Option<ImportState>, ImportError> {
    Ok(state::load_import_state(db).await?)
}

/// The scheduled-trigger policy: first re-dispatch any currently-recorded
/// failed offsets (sequentially), then start a new offset-0 batch with
/// default options.
///
/// Failed retries are logged and skipped; the offset stays recorded for
/// the next firing.
///
/// # Errors
///
/// Returns [`ImportError`] if the state cannot be read or the offset-0
/// batch fails fatally.
pub async fn run_scheduled_pass(
    db: &dyn Database,
    fetcher: &dyn DatasetFetcher,
) -> Result<(), ImportError> {
    if let Some(existing) = state::load_import_state(db).await? {
        let failed = existing.failed_offsets.clone();

        if !failed.is_empty() {
            log::info!("Scheduled import: retrying {} failed offsets", failed.len());

            for offset in failed {
                let options = BatchOptions {
                    city_population_threshold: existing.options.city_population_threshold,
                    include_alternate_names: existing.options.include_alternate_names,
                    offset,
                    limit: existing.options.limit,
                    clean_start: false,
                };

                if let Err(e) = run_batch(db, fetcher, &options).await {
                    log::warn!("Scheduled retry of offset {offset} failed: {e}");
                }
            }
        }
    }

    run_batch(db, fetcher, &BatchOptions::default()).await?;

    Ok(())
}

/// Rejects out-of-range options before any batch work begins.
fn validate_options(options: &BatchOptions) -> Result<(), ImportError> {
    if options.limit == 0 || options.limit > MAX_LIMIT {
        return Err(ImportError::Validation {
            message: format!(
                "limit must be between 1 and {MAX_LIMIT}, got {}",
                options.limit
            ),
        });
    }

    Ok(())
}

async fn run_batch_inner(
    db: &dyn Database,
    fetcher: &dyn DatasetFetcher,
    options: &BatchOptions,
    selected: CityFile,
) -> Result<BatchSummary, ImportError> {
    let start = Instant::now();

    // Resolve the lineage: clean start (or first run) rebuilds the city
    // table and the country data; otherwise the existing state is reused
    // with the newly supplied options overlaid. The lineage keeps its
    // original dump file even if the threshold changed mid-lineage.
    let existing = state::load_import_state(db).await?;

    let (mut import_state, city_file) = match existing {
        Some(mut reused) if !options.clean_start => {
            let city_file = reused.city_file_name.parse().unwrap_or_else(|_| {
                log::warn!(
                    "Unknown city file '{}' on state, using {selected}",
                    reused.city_file_name
                );
                selected
            });
            reused.resume(options);
            (reused, city_file)
        }
        _ => (
            initialize_lineage(db, fetcher, options, selected).await?,
            selected,
        ),
    };

    // The full dataset is re-fetched on every batch call; only the line
    // count survives across batches, and only from the first one.
    let text = fetcher.fetch_city_file(city_file).await?;
    let lines: Vec<&str> = text.lines().collect();

    import_state.record_total_lines(lines.len() as u64);
    let total_lines = import_state.total_lines.unwrap_or(lines.len() as u64);

    let window = batch_window(&lines, options.offset, options.limit);
    let outcome = process_window(
        window,
        options.offset,
        options.city_population_threshold,
        options.include_alternate_names,
    );

    let mut errors = outcome.errors;
    let mut imported = 0u64;

    for city in &outcome.cities {
        match queries::upsert_city(db, city).await {
            Ok(()) => imported += 1,
            Err(e) => errors.push(format!("geoname {}: {e}", city.geoname_id)),
        }
    }

    let lines_processed = window.len() as u64;
    let now = Utc::now();

    import_state.apply_batch(
        options.offset,
        lines_processed,
        imported,
        outcome.skipped,
        errors.clone(),
        now,
    );
    import_state.finalize_if_complete(options.offset, options.limit, now);

    state::save_import_state(db, &import_state).await?;

    log::info!(
        "Batch offset={} limit={}: processed {lines_processed} lines, imported {imported}, skipped {}, {} errors, status={}, took {:.1}s",
        options.offset,
        options.limit,
        outcome.skipped,
        errors.len(),
        import_state.status,
        start.elapsed().as_secs_f64(),
    );

    Ok(BatchSummary {
        status: import_state.status,
        city_file_name: import_state.city_file_name,
        offset: options.offset,
        limit: options.limit,
        total_lines,
        lines_processed,
        cities_imported: imported,
        cities_skipped: outcome.skipped,
        errors,
    })
}

/// Starts a new lineage: clears the city table, re-imports the full
/// country list (relational rows plus the key-value snapshot), and
/// returns a fresh state document.
async fn initialize_lineage(
    db: &dyn Database,
    fetcher: &dyn DatasetFetcher,
    options: &BatchOptions,
    city_file: CityFile,
) -> Result<ImportState, ImportError> {
    log::info!("Starting import lineage using {city_file}");

    queries::reset_cities(db).await?;

    let text = fetcher.fetch_country_file().await?;
    let countries = parse_country_file(&text);

    queries::replace_countries(db, &countries).await?;
    state::save_country_snapshot(db, &countries).await?;

    log::info!("Imported {} countries", countries.len());

    Ok(ImportState::fresh(options, city_file, Utc::now()))
}

/// Marks the persisted state failed with the fatal message, creating a
/// fresh document when none exists yet. Best effort: a failure here is
/// only logged, since the original error is already propagating.
async fn persist_fatal(
    db: &dyn Database,
    options: &BatchOptions,
    city_file: CityFile,
    message: &str,
) {
    let now = Utc::now();

    let result = match state::load_import_state(db).await {
        Ok(Some(mut existing)) => {
            existing.mark_fatal(message.to_string(), now);
            state::save_import_state(db, &existing).await
        }
        Ok(None) => {
            let mut fresh = ImportState::fresh(options, city_file, now);
            fresh.mark_fatal(message.to_string(), now);
            state::save_import_state(db, &fresh).await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        log::error!("Failed to persist fatal import error: {e}");
    }
}

/// Slices the dataset's line sequence to the batch window
/// `[offset, offset + limit)`, clamped to the end of the dataset.
#[must_use]
pub fn batch_window<'a>(lines: &'a [&'a str], offset: u64, limit: u64) -> &'a [&'a str] {
    let start = usize::try_from(offset)
        .unwrap_or(usize::MAX)
        .min(lines.len());
    let end = start
        .saturating_add(usize::try_from(limit).unwrap_or(usize::MAX))
        .min(lines.len());

    &lines[start..end]
}

/// Parsed-and-filtered contents of one batch window, before any rows are
/// written.
struct WindowOutcome {
    /// Records that passed the population filter, in line order.
    cities: Vec<CityRecord>,
    /// Lines skipped by the population filter.
    skipped: u64,
    /// Record-level parse errors, one message per bad line.
    errors: Vec<String>,
}

/// Parses each line of the window and applies the population filter.
/// Lines that fail to parse are collected as errors; filtered-out lines
/// are counted but still occupy their slot in the window.
fn process_window(
    window: &[&str],
    offset: u64,
    threshold: u64,
    include_alternate_names: bool,
) -> WindowOutcome {
    let threshold = i64::try_from(threshold).unwrap_or(i64::MAX);

    let mut cities = Vec::new();
    let mut skipped = 0u64;
    let mut errors = Vec::new();

    for (i, line) in window.iter().enumerate() {
        match parse_city_line(line, include_alternate_names) {
            Ok(city) => {
                if city.population < threshold {
                    skipped += 1;
                } else {
                    cities.push(city);
                }
            }
            Err(e) => {
                errors.push(format!("line {}: {e}", offset + i as u64));
            }
        }
    }

    WindowOutcome {
        cities,
        skipped,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;

    fn city_line(geoname_id: i64, population: i64) -> String {
        format!(
            "{geoname_id}\tTown {geoname_id}\tTown {geoname_id}\t\t10.0\t20.0\tP\tPPL\tDE\t\t01\t\t\t\t{population}\t\t100\tEurope/Berlin\t2024-01-01"
        )
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn window_is_clamped_to_dataset_end() {
        let lines = ["a", "b", "c", "d", "e"];
        assert_eq!(batch_window(&lines, 0, 3), &["a", "b", "c"]);
        assert_eq!(batch_window(&lines, 3, 50), &["d", "e"]);
        assert_eq!(batch_window(&lines, 5, 50), &[] as &[&str]);
        assert_eq!(batch_window(&lines, 100, 50), &[] as &[&str]);
    }

    #[test]
    fn window_length_matches_min_of_limit_and_remainder() {
        let lines: Vec<String> = (0..130).map(|i| i.to_string()).collect();
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();

        for offset in [0u64, 50, 100, 129, 130, 200] {
            let expected = 130u64.saturating_sub(offset).min(50);
            assert_eq!(batch_window(&lines, offset, 50).len() as u64, expected);
        }
    }

    #[test]
    fn limit_bounds_are_validated() {
        let zero = BatchOptions {
            limit: 0,
            ..BatchOptions::default()
        };
        assert!(matches!(
            validate_options(&zero),
            Err(ImportError::Validation { .. })
        ));

        let huge = BatchOptions {
            limit: MAX_LIMIT + 1,
            ..BatchOptions::default()
        };
        assert!(matches!(
            validate_options(&huge),
            Err(ImportError::Validation { .. })
        ));

        assert!(validate_options(&BatchOptions::default()).is_ok());
    }

    #[test]
    fn population_filter_skips_below_threshold() {
        let lines = [
            city_line(1, 20_000),
            city_line(2, 14_999),
            city_line(3, 15_000),
            city_line(4, 0),
        ];
        let window: Vec<&str> = lines.iter().map(String::as_str).collect();

        let outcome = process_window(&window, 0, 15_000, false);

        assert_eq!(outcome.cities.len(), 2);
        assert_eq!(outcome.skipped, 2);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.cities[0].geoname_id, 1);
        assert_eq!(outcome.cities[1].geoname_id, 3);
    }

    #[test]
    fn bad_lines_are_collected_with_absolute_line_numbers() {
        let lines = [city_line(1, 20_000), "garbage line".to_string()];
        let window: Vec<&str> = lines.iter().map(String::as_str).collect();

        let outcome = process_window(&window, 100, 15_000, false);

        assert_eq!(outcome.cities.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("line 101:"));
    }

    // 130-line dataset, limit 50, threshold 15000, 40 lines below the
    // threshold: offsets {0, 50, 100}, the last batch processes 30
    // lines, and the lineage completes with 90 imported and 40 skipped.
    #[test]
    fn full_lineage_scenario_completes() {
        let lines: Vec<String> = (0..130)
            .map(|i| {
                // 40 of the 130 lines fall below the threshold.
                let population = if i % 13 < 4 { 1_000 } else { 20_000 };
                city_line(i64::from(i) + 1, population)
            })
            .collect();
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();

        let options = BatchOptions::default();
        let mut state = ImportState::fresh(&options, CityFile::Cities15000, t0());
        state.record_total_lines(lines.len() as u64);

        for offset in [0u64, 50, 100] {
            let window = batch_window(&lines, offset, 50);
            let outcome = process_window(window, offset, 15_000, false);
            state.apply_batch(
                offset,
                window.len() as u64,
                outcome.cities.len() as u64,
                outcome.skipped,
                outcome.errors,
                t0(),
            );
            state.finalize_if_complete(offset, 50, t0());
        }

        assert_eq!(state.processed_lines, 130);
        assert_eq!(state.skipped_cities, 40);
        assert_eq!(state.processed_cities, 90);
        assert!(state.failed_offsets.is_empty());
        assert_eq!(state.status, ImportStatus::Completed);
    }

    #[test]
    fn lineage_with_bad_lines_ends_failed() {
        let mut lines: Vec<String> = (0..130).map(|i| city_line(i64::from(i) + 1, 20_000)).collect();
        lines[57] = "not\ta\tvalid\tline".to_string();
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();

        let options = BatchOptions::default();
        let mut state = ImportState::fresh(&options, CityFile::Cities15000, t0());
        state.record_total_lines(lines.len() as u64);

        for offset in [0u64, 50, 100] {
            let window = batch_window(&lines, offset, 50);
            let outcome = process_window(window, offset, 15_000, false);
            state.apply_batch(
                offset,
                window.len() as u64,
                outcome.cities.len() as u64,
                outcome.skipped,
                outcome.errors,
                t0(),
            );
            state.finalize_if_complete(offset, 50, t0());
        }

        assert_eq!(state.status, ImportStatus::Failed);
        assert_eq!(state.failed_offsets, vec![50]);
        assert_eq!(state.processed_lines, 130);
    }
}
