//! Thin HTTP layer shared by the registry client and the installer.
//!
//! `file://` URLs are read from disk, which lets custom tools point at local
//! archives.

use corepin_core::{Error, Result};
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::debug;

/// HTTP client with corepin's user agent.
#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub(crate) fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("corepin/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::registry(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Fetch the body at `url`.
    pub(crate) async fn get_bytes(&self, url: &str, accept: Option<&str>) -> Result<Vec<u8>> {
        if let Some(path) = url.strip_prefix("file://") {
            debug!(%path, "Reading local file");
            return tokio::fs::read(path)
                .await
                .map_err(|e| Error::io(e, Some(path.into()), "read local download"));
        }

        debug!(%url, "Fetching");
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        let response = request.send().await.map_err(|e| {
            Error::registry_with_help(
                format!("Failed to fetch {}: {}", url, e),
                "Check your network connection, or point COREPIN_NPM_REGISTRY at a reachable mirror",
            )
        })?;

        if !response.status().is_success() {
            return Err(Error::registry(format!(
                "Request to {} failed (HTTP {})",
                url,
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| Error::registry(format!("Failed to read response from {}: {}", url, e)))
    }

    /// Fetch and parse a JSON document.
    pub(crate) async fn get_json(&self, url: &str, accept: Option<&str>) -> Result<Value> {
        let body = self.get_bytes(url, accept).await?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::registry(format!("Invalid JSON from {}: {}", url, e)))
    }
}
