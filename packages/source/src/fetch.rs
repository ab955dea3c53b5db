//! Dataset download and decompression.
//!
//! The country file is served as plain text; the city files are zip
//! archives containing a single text member of the same stem. Archives
//! are decompressed fully in memory — the decompressed payload of even
//! the largest city file fits comfortably.

use std::io::Read as _;

use async_trait::async_trait;
use geonames_import_models::CityFile;

use crate::{SourceError, retry};

/// Default GeoNames export server.
pub const DEFAULT_BASE_URL: &str = "https://download.geonames.org/export/dump";

/// Name of the country metadata file on the export server.
pub const COUNTRY_FILE_NAME: &str = "countryInfo.txt";

/// Yields the decompressed text of the GeoNames dataset files.
///
/// This is the seam between the batch processor and the network: the
/// processor only ever sees decompressed text, so tests substitute a
/// stub implementation while production uses [`HttpDatasetFetcher`].
#[async_trait]
pub trait DatasetFetcher: Send + Sync {
    /// Fetches the text of the country file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the download fails.
    async fn fetch_country_file(&self) -> Result<String, SourceError>;

    /// Fetches and decompresses the text of the given city file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the download fails or the archive is
    /// unreadable.
    async fn fetch_city_file(&self, file: CityFile) -> Result<String, SourceError>;
}

/// Downloads dataset files from the GeoNames export server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDatasetFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDatasetFetcher {
    /// Creates a fetcher for the export server given by
    /// `GEONAMES_BASE_URL` (falling back to [`DEFAULT_BASE_URL`]).
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        let base_url =
            std::env::var("GEONAMES_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::with_base_url(client, base_url)
    }

    /// Creates a fetcher for a specific export server base URL.
    #[must_use]
    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }
}

#[async_trait]
impl DatasetFetcher for HttpDatasetFetcher {
    async fn fetch_country_file(&self) -> Result<String, SourceError> {
        let url = format!("{}/{COUNTRY_FILE_NAME}", self.base_url);
        log::info!("Downloading country file from {url}");

        retry::send_text(|| self.client.get(&url)).await
    }

    async fn fetch_city_file(&self, file: CityFile) -> Result<String, SourceError> {
        let url = format!("{}/{}", self.base_url, file.archive_name());
        log::info!("Downloading city archive from {url}");

        let bytes = retry::send_bytes(|| self.client.get(&url)).await?;
        log::debug!("Downloaded {} bytes from {url}", bytes.len());

        extract_archive_member(&bytes, &file.member_name())
    }
}

/// Extracts a named member from a zip archive and returns its contents
/// as text.
///
/// # Errors
///
/// Returns [`SourceError::Archive`] if the archive is unreadable or the
/// member is missing, or [`SourceError::Io`] if the member cannot be
/// read as UTF-8 text.
pub fn extract_archive_member(archive: &[u8], member: &str) -> Result<String, SourceError> {
    let cursor = std::io::Cursor::new(archive);

    let mut zip = zip::ZipArchive::new(cursor).map_err(|e| SourceError::Archive {
        message: format!("unreadable archive: {e}"),
    })?;

    let mut file = zip.by_name(member).map_err(|e| SourceError::Archive {
        message: format!("archive member '{member}' not found: {e}"),
    })?;

    let mut text = String::new();
    file.read_to_string(&mut text)?;

    log::debug!("Decompressed {member} to {} bytes", text.len());

    Ok(text)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    fn archive_with_member(member: &str, contents: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file(member, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn extracts_named_member() {
        let archive = archive_with_member("cities15000.txt", "line one\nline two\n");
        let text = extract_archive_member(&archive, "cities15000.txt").unwrap();
        assert_eq!(text, "line one\nline two\n");
    }

    #[test]
    fn missing_member_is_an_archive_error() {
        let archive = archive_with_member("cities15000.txt", "data");
        let err = extract_archive_member(&archive, "cities5000.txt").unwrap_err();
        assert!(matches!(err, SourceError::Archive { .. }));
    }

    #[test]
    fn garbage_bytes_are_an_archive_error() {
        let err = extract_archive_member(b"not a zip file", "cities15000.txt").unwrap_err();
        assert!(matches!(err, SourceError::Archive { .. }));
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let fetcher = HttpDatasetFetcher::with_base_url(
            reqwest::Client::new(),
            "https://example.com/dump/",
        );
        assert_eq!(fetcher.base_url, "https://example.com/dump");
    }
}
