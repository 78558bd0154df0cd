//! File and URL manifest references

use std::time::Duration;

use clusterkit_common::Error;
use tracing::debug;

const FILE_PREFIX: &str = "file://";
const HTTP_PREFIXES: &[&str] = &["http://", "https://"];

/// Timeout for fetching a remote manifest
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether `name` refers to a manifest outside the registry
pub fn is_reference(name: &str) -> bool {
    name.starts_with(FILE_PREFIX) || HTTP_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Read the manifest a reference points at.
///
/// `file://` paths are read from disk; `http(s)://` URLs are fetched and
/// must answer with a success status.
pub async fn read_reference(reference: &str) -> Result<String, Error> {
    if let Some(path) = reference.strip_prefix(FILE_PREFIX) {
        debug!(path = %path, "reading manifest file");
        return tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::io(path, e));
    }

    if HTTP_PREFIXES.iter().any(|p| reference.starts_with(p)) {
        debug!(url = %reference, "fetching manifest");
        return fetch(reference).await;
    }

    Err(Error::UnknownResource {
        name: reference.to_string(),
    })
}

async fn fetch(url: &str) -> Result<String, Error> {
    let fetch_err = |message: String| Error::Fetch {
        url: url.to_string(),
        message,
    };

    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| fetch_err(e.to_string()))?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| fetch_err(e.to_string()))?;
    let response = response
        .error_for_status()
        .map_err(|e| fetch_err(e.to_string()))?;
    response.text().await.map_err(|e| fetch_err(e.to_string()))
}
