//! Offset computation and batch dispatch.
//!
//! The driver is stateless: it computes which offsets to request, posts
//! each one to the import API, and collects the offsets whose request
//! failed. All import progress lives server-side in the import state
//! document; the driver never mutates it directly.

use std::time::Duration;

use serde_json::json;

/// Cooldown between dispatch groups, so concurrent batches don't
/// overwhelm the server's backing stores.
const GROUP_COOLDOWN: Duration = Duration::from_secs(1);

/// Attempts when polling the import state for the dataset's line count.
const DISCOVERY_MAX_RETRIES: u32 = 10;

/// Delay between discovery poll attempts.
const DISCOVERY_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Errors from driving the import API.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error or an unparseable body.
    #[error("{message}")]
    Server {
        /// Description of what went wrong.
        message: String,
    },

    /// The offset specification could not be parsed.
    #[error("invalid offsets '{spec}': {message}")]
    Offsets {
        /// The specification as given.
        spec: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The dataset's line count never appeared in the import state.
    #[error("dataset size was not discovered after 10 attempts")]
    Discovery,

    /// No import state exists to retry from.
    #[error("no import state found, run a full import first")]
    NoState,
}

/// Settings shared by every batch request of one driver run.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Base URL of the import API server.
    pub server: String,
    /// Lines per batch; also the step of range offset specifications.
    pub batch_size: u64,
    /// Requests issued concurrently within one dispatch group.
    pub concurrent_requests: usize,
    /// Population threshold forwarded to every batch.
    pub threshold: u64,
    /// Whether batches store the alternate-names column.
    pub include_alternate_names: bool,
}

/// Runs a full import: triggers the offset-0 discovery batch, waits for
/// the dataset's line count to appear in the import state, then
/// dispatches the remaining offsets in concurrent groups.
///
/// # Errors
///
/// Returns [`DriverError`] if the dataset size is never discovered. A
/// failed batch request does not abort the run; it is collected and
/// reported at the end.
pub async fn run_full(
    client: &reqwest::Client,
    config: &DriverConfig,
    clean: bool,
) -> Result<(), DriverError> {
    log::info!(
        "Triggering discovery batch at offset 0{}",
        if clean { " (clean start)" } else { "" }
    );

    let mut failed: Vec<u64> = Vec::new();

    if let Err(e) = send_batch(client, config, 0, clean).await {
        log::warn!("Discovery batch at offset 0 failed: {e}");
        failed.push(0);
    }

    let total_lines = wait_for_total_lines(client, &config.server).await?;
    log::info!(
        "Dataset has {total_lines} lines, {} batches of {}",
        total_lines.div_ceil(config.batch_size.max(1)),
        config.batch_size
    );

    // Offset 0 was already dispatched as the discovery batch.
    let offsets: Vec<u64> = offsets_for_total(total_lines, config.batch_size)
        .into_iter()
        .skip(1)
        .collect();

    failed.extend(dispatch_groups(client, config, &offsets).await);
    report(config, &failed);

    Ok(())
}

/// Dispatches an explicit offset specification: a single value, an
/// inclusive range stepped by the batch size, or a comma-separated list.
///
/// # Errors
///
/// Returns [`DriverError`] if the specification cannot be parsed.
pub async fn run_manual(
    client: &reqwest::Client,
    config: &DriverConfig,
    spec: &str,
) -> Result<(), DriverError> {
    let offsets = parse_offsets(spec, config.batch_size)?;
    log::info!("Dispatching {} offsets", offsets.len());

    let failed = dispatch_groups(client, config, &offsets).await;
    report(config, &failed);

    Ok(())
}

/// Re-dispatches the failed offsets recorded in the import state,
/// sequentially, since retries are intentionally throttled harder than
/// first-pass imports.
///
/// # Errors
///
/// Returns [`DriverError`] if no import state exists or it cannot be
/// read.
pub async fn run_retry(client: &reqwest::Client, server: &str) -> Result<(), DriverError> {
    let Some(state) = fetch_state(client, server).await? else {
        return Err(DriverError::NoState);
    };

    let status = state["status"].as_str().unwrap_or_default().to_string();
    if status != "failed" {
        log::info!("Import status is '{status}', nothing to retry");
        return Ok(());
    }

    let offsets: Vec<u64> = state["failedOffsets"]
        .as_array()
        .map(|a| a.iter().filter_map(serde_json::Value::as_u64).collect())
        .unwrap_or_default();

    if offsets.is_empty() {
        log::info!("No failed offsets recorded");
        return Ok(());
    }

    // Reuse the lineage's last-used options for the retried batches.
    let options = &state["options"];
    let config = DriverConfig {
        server: server.to_string(),
        batch_size: options["limit"].as_u64().unwrap_or(50),
        concurrent_requests: 1,
        threshold: options["cityPopulationThreshold"].as_u64().unwrap_or(15_000),
        include_alternate_names: options["includeAlternateNames"].as_bool().unwrap_or(false),
    };

    log::info!("Retrying {} failed offsets sequentially", offsets.len());

    let mut failed = Vec::new();
    for &offset in &offsets {
        if let Err(e) = send_batch(client, &config, offset, false).await {
            log::warn!("Retry of offset {offset} failed: {e}");
            failed.push(offset);
        }
    }

    report(&config, &failed);

    Ok(())
}

/// Dispatches the offsets in groups of `concurrent_requests`, awaiting
/// each group before the next and sleeping the cooldown in between.
/// Returns the offsets whose request failed.
pub async fn dispatch_groups(
    client: &reqwest::Client,
    config: &DriverConfig,
    offsets: &[u64],
) -> Vec<u64> {
    let group_size = config.concurrent_requests.max(1);
    let group_count = offsets.chunks(group_size).count();

    let mut failed = Vec::new();

    for (group_index, group) in offsets.chunks(group_size).enumerate() {
        log::info!(
            "Dispatching group {}/{group_count} ({} offsets)",
            group_index + 1,
            group.len()
        );

        let results = futures::future::join_all(
            group
                .iter()
                .map(|&offset| send_batch(client, config, offset, false)),
        )
        .await;

        for (&offset, result) in group.iter().zip(results) {
            if let Err(e) = result {
                log::warn!("Batch at offset {offset} failed: {e}");
                failed.push(offset);
            }
        }

        if group_index + 1 < group_count {
            tokio::time::sleep(GROUP_COOLDOWN).await;
        }
    }

    failed
}

/// Posts one batch request to the import entry point.
///
/// # Errors
///
/// Returns [`DriverError`] on transport failure, a non-success status,
/// or an unparseable response body.
async fn send_batch(
    client: &reqwest::Client,
    config: &DriverConfig,
    offset: u64,
    clean_start: bool,
) -> Result<(), DriverError> {
    let body = json!({
        "cityPopulationThreshold": config.threshold,
        "includeAlternateNames": config.include_alternate_names,
        "offset": offset,
        "limit": config.batch_size,
        "cleanStart": clean_start,
    });

    let response = client
        .post(format!("{}/api/import", config.server))
        .json(&body)
        .send()
        .await?;

    let status = response.status();

    if !status.is_success() {
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v["error"].as_str().map(String::from))
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(DriverError::Server {
            message: format!("HTTP {status}: {message}"),
        });
    }

    let summary: serde_json::Value =
        response.json().await.map_err(|e| DriverError::Server {
            message: format!("unparseable response: {e}"),
        })?;

    // Record-level failures are tracked server-side in failedOffsets;
    // surface them in the driver log for visibility.
    if let Some(errors) = summary["errors"].as_array()
        && !errors.is_empty()
    {
        log::warn!(
            "Batch at offset {offset} recorded {} row errors",
            errors.len()
        );
    }

    Ok(())
}

/// Reads the import state from the server; `None` when no import has
/// been started.
///
/// # Errors
///
/// Returns [`DriverError`] on transport failure, a non-success status,
/// or an unparseable body.
pub async fn fetch_state(
    client: &reqwest::Client,
    server: &str,
) -> Result<Option<serde_json::Value>, DriverError> {
    let response = client
        .get(format!("{server}/api/import/state"))
        .send()
        .await?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }

    let status = response.status();
    if !status.is_success() {
        return Err(DriverError::Server {
            message: format!("HTTP {status} reading import state"),
        });
    }

    let state = response.json().await.map_err(|e| DriverError::Server {
        message: format!("unparseable import state: {e}"),
    })?;

    Ok(Some(state))
}

/// Polls the import state until the dataset's line count appears.
///
/// # Errors
///
/// Returns [`DriverError::Discovery`] after all attempts are exhausted.
async fn wait_for_total_lines(
    client: &reqwest::Client,
    server: &str,
) -> Result<u64, DriverError> {
    for attempt in 1..=DISCOVERY_MAX_RETRIES {
        match fetch_state(client, server).await {
            Ok(Some(state)) => {
                if let Some(total) = state["totalLines"].as_u64() {
                    return Ok(total);
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("Failed to read import state: {e}"),
        }

        log::info!("Waiting for dataset size discovery ({attempt}/{DISCOVERY_MAX_RETRIES})...");
        tokio::time::sleep(DISCOVERY_RETRY_DELAY).await;
    }

    Err(DriverError::Discovery)
}

/// Computes the offsets of a full import: multiples of `batch_size`
/// covering `[0, total_lines)`.
#[must_use]
pub fn offsets_for_total(total_lines: u64, batch_size: u64) -> Vec<u64> {
    if total_lines == 0 || batch_size == 0 {
        return Vec::new();
    }

    (0..total_lines.div_ceil(batch_size))
        .map(|i| i * batch_size)
        .collect()
}

/// Parses an offset specification: a single value (`500`), an inclusive
/// range stepped by the batch size (`0-2000`), or a comma-separated list
/// (`0,50,100`).
///
/// # Errors
///
/// Returns [`DriverError::Offsets`] if any component is not a
/// non-negative integer or the range is reversed.
pub fn parse_offsets(spec: &str, batch_size: u64) -> Result<Vec<u64>, DriverError> {
    let parse_one = |value: &str| {
        value.trim().parse::<u64>().map_err(|_| DriverError::Offsets {
            spec: spec.to_string(),
            message: format!("'{}' is not a non-negative integer", value.trim()),
        })
    };

    if let Some((start, end)) = spec.split_once('-') {
        let start = parse_one(start)?;
        let end = parse_one(end)?;

        if end < start {
            return Err(DriverError::Offsets {
                spec: spec.to_string(),
                message: "range end is before range start".to_string(),
            });
        }

        let step = batch_size.max(1);
        let mut offsets = Vec::new();
        let mut offset = start;
        while offset <= end {
            offsets.push(offset);
            offset += step;
        }
        return Ok(offsets);
    }

    spec.split(',').map(parse_one).collect()
}

/// Logs the aggregate result and, when batches failed, the exact
/// invocation that retries them.
fn report(config: &DriverConfig, failed: &[u64]) {
    if failed.is_empty() {
        log::info!("All batches dispatched successfully");
        return;
    }

    let list = failed
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");

    log::warn!("{} batches failed: {list}", failed.len());
    log::warn!(
        "Retry with: geonames_import_cli --server {} offsets {list} --batch-size {}",
        config.server,
        config.batch_size
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_full_import_offsets() {
        assert_eq!(offsets_for_total(130, 50), vec![0, 50, 100]);
        assert_eq!(offsets_for_total(150, 50), vec![0, 50, 100]);
        assert_eq!(offsets_for_total(151, 50), vec![0, 50, 100, 150]);
        assert_eq!(offsets_for_total(1, 50), vec![0]);
        assert!(offsets_for_total(0, 50).is_empty());
    }

    #[test]
    fn parses_single_offset() {
        assert_eq!(parse_offsets("500", 50).unwrap(), vec![500]);
        assert_eq!(parse_offsets(" 500 ", 50).unwrap(), vec![500]);
    }

    #[test]
    fn parses_range_stepped_by_batch_size() {
        assert_eq!(parse_offsets("0-200", 50).unwrap(), vec![0, 50, 100, 150, 200]);
        assert_eq!(parse_offsets("0-199", 100).unwrap(), vec![0, 100]);
        assert_eq!(parse_offsets("50-50", 50).unwrap(), vec![50]);
    }

    #[test]
    fn parses_comma_separated_list() {
        assert_eq!(parse_offsets("0,50,100", 50).unwrap(), vec![0, 50, 100]);
        assert_eq!(parse_offsets("100, 0", 50).unwrap(), vec![100, 0]);
    }

    #[test]
    fn rejects_malformed_specs() {
        assert!(matches!(
            parse_offsets("abc", 50),
            Err(DriverError::Offsets { .. })
        ));
        assert!(matches!(
            parse_offsets("0,fifty", 50),
            Err(DriverError::Offsets { .. })
        ));
        assert!(matches!(
            parse_offsets("200-100", 50),
            Err(DriverError::Offsets { .. })
        ));
    }
}
