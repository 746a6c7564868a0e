//! Shared HTTP plumbing for provider adapters.

use gpuatlas_core::{sha256_hex, AdapterError, AdapterResult};
use reqwest::Client;
use std::time::Duration;

/// Desktop browser user agent. Several pricing pages serve a stripped
/// (or blocked) response to default HTTP client agents.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// A fetched document plus the SHA-256 of its raw body.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub body: String,
    pub sha256: String,
}

/// Builds the HTTP client shared by all adapters.
///
/// # Errors
/// Returns an error if the TLS backend fails to initialize.
pub fn build_client(timeout: Duration) -> AdapterResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(from_reqwest)
}

/// Fetches a document with browser-like headers and hashes the body.
///
/// # Errors
/// Returns `AdapterError::Status` for non-2xx responses and
/// `AdapterError::Fetch` for transport failures.
pub async fn fetch_page(client: &Client, url: &str) -> AdapterResult<FetchedBody> {
    let response = client
        .get(url)
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        )
        .header("Accept-Language", "en-US,en;q=0.5")
        .header("Upgrade-Insecure-Requests", "1")
        .send()
        .await
        .map_err(from_reqwest)?;

    let status = response.status();
    if !status.is_success() {
        return Err(AdapterError::status(
            status.as_u16(),
            format!("unexpected response from {url}"),
        ));
    }

    let body = response.text().await.map_err(from_reqwest)?;
    let sha256 = sha256_hex(body.as_bytes());
    Ok(FetchedBody { body, sha256 })
}

/// Fetches a JSON document and hashes its raw body before decoding.
///
/// # Errors
/// Returns `AdapterError::Status` for non-2xx responses,
/// `AdapterError::Fetch` for transport failures, and
/// `AdapterError::Parse` when the body is not the expected shape.
pub async fn fetch_json<T: serde::de::DeserializeOwned>(
    client: &Client,
    url: &str,
) -> AdapterResult<(T, String)> {
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(from_reqwest)?;

    let status = response.status();
    if !status.is_success() {
        return Err(AdapterError::status(
            status.as_u16(),
            format!("unexpected response from {url}"),
        ));
    }

    let body = response.text().await.map_err(from_reqwest)?;
    let sha256 = sha256_hex(body.as_bytes());
    let decoded = serde_json::from_str(&body)
        .map_err(|err| AdapterError::parse(format!("invalid JSON from {url}: {err}")))?;
    Ok((decoded, sha256))
}

/// Maps transport-level reqwest failures into the adapter error taxonomy.
/// Lives here because the error type and reqwest are foreign to each other.
pub fn from_reqwest(err: reqwest::Error) -> AdapterError {
    if let Some(status) = err.status() {
        AdapterError::status(status.as_u16(), err.to_string())
    } else {
        AdapterError::fetch(err.to_string())
    }
}
