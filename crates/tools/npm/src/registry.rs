//! Registry client for npm registries and URL-listed version documents.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use corepin_core::{Config, Error, RegistryClient, RegistrySpec, Result};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::http::HttpClient;

/// Public npm registry.
pub const DEFAULT_NPM_REGISTRY: &str = "https://registry.npmjs.org";

/// Abbreviated metadata is enough for listing versions and tags.
const NPM_ACCEPT: &str =
    "application/vnd.npm.install-v1+json; q=1.0, application/json; q=0.8, */*";

/// Tag holding the latest stable release in URL registry documents.
const STABLE_TAG: &str = "stable";

/// [`RegistryClient`] backed by HTTP.
#[derive(Debug, Clone)]
pub struct NpmRegistryClient {
    http: HttpClient,
    npm_registry: String,
}

impl NpmRegistryClient {
    /// Create a client honoring the configured npm registry override.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new()?,
            npm_registry: config
                .npm_registry
                .clone()
                .unwrap_or_else(|| DEFAULT_NPM_REGISTRY.to_string()),
        })
    }

    /// Base URL used for npm-type registries.
    #[must_use]
    pub fn registry_url(&self) -> &str {
        &self.npm_registry
    }

    fn package_url(&self, package: &str) -> String {
        format!("{}/{}", self.npm_registry, package)
    }

    async fn document(&self, spec: &RegistrySpec) -> Result<(Value, String)> {
        match spec {
            RegistrySpec::Npm { package } => {
                let doc = self
                    .http
                    .get_json(&self.package_url(package), Some(NPM_ACCEPT))
                    .await?;
                Ok((doc, "versions".to_string()))
            }
            RegistrySpec::Url { url, fields } => {
                let doc = self.http.get_json(url, None).await?;
                Ok((doc, fields.versions.clone()))
            }
        }
    }
}

#[async_trait]
impl RegistryClient for NpmRegistryClient {
    #[instrument(skip(self), fields(registry = ?spec))]
    async fn fetch_available_versions(&self, spec: &RegistrySpec) -> Result<Vec<String>> {
        let (doc, field) = self.document(spec).await?;
        let versions = versions_from(&doc, &field)?;
        debug!(count = versions.len(), "Fetched versions");
        Ok(versions)
    }

    #[instrument(skip(self), fields(registry = ?spec))]
    async fn fetch_available_tags(&self, spec: &RegistrySpec) -> Result<HashMap<String, String>> {
        match spec {
            RegistrySpec::Npm { package } => {
                let doc = self
                    .http
                    .get_json(&self.package_url(package), Some(NPM_ACCEPT))
                    .await?;
                tags_from(&doc, "dist-tags")
            }
            RegistrySpec::Url { url, fields } => {
                let doc = self.http.get_json(url, None).await?;
                tags_from(&doc, &fields.tags)
            }
        }
    }

    #[instrument(skip(self), fields(registry = ?spec))]
    async fn fetch_latest_stable_version(&self, spec: &RegistrySpec) -> Result<String> {
        match spec {
            RegistrySpec::Npm { package } => {
                let url = format!("{}/latest", self.package_url(package));
                let doc = self.http.get_json(&url, None).await?;
                latest_reference(&doc)
            }
            RegistrySpec::Url { url, fields } => {
                let doc = self.http.get_json(url, None).await?;
                tags_from(&doc, &fields.tags)?
                    .remove(STABLE_TAG)
                    .ok_or_else(|| {
                        Error::registry(format!("No '{}' tag listed at {}", STABLE_TAG, url))
                    })
            }
        }
    }
}

/// Version list under `field`: either an array of strings or the keys of an
/// object (npm's `versions` map).
pub(crate) fn versions_from(doc: &Value, field: &str) -> Result<Vec<String>> {
    match doc.get(field) {
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|item| item.as_str().map(String::from))
            .collect()),
        Some(Value::Object(map)) => Ok(map.keys().cloned().collect()),
        _ => Err(Error::registry(format!(
            "Registry document has no '{}' list",
            field
        ))),
    }
}

/// Tag map under `field`. Non-string values are dropped.
pub(crate) fn tags_from(doc: &Value, field: &str) -> Result<HashMap<String, String>> {
    let Some(Value::Object(map)) = doc.get(field) else {
        return Err(Error::registry(format!(
            "Registry document has no '{}' map",
            field
        )));
    };
    Ok(map
        .iter()
        .filter_map(|(tag, version)| version.as_str().map(|v| (tag.clone(), v.to_string())))
        .collect())
}

/// Reference for an npm `latest` manifest: `version+sha512.<hex>` when the
/// manifest carries a sha512 integrity, the bare version otherwise.
pub(crate) fn latest_reference(doc: &Value) -> Result<String> {
    let version = doc
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::registry("Latest manifest has no version"))?;

    let integrity = doc
        .pointer("/dist/integrity")
        .and_then(Value::as_str)
        .and_then(|integrity| integrity.split_whitespace().find_map(|entry| entry.strip_prefix("sha512-")));

    match integrity.map(|digest| STANDARD.decode(digest)) {
        Some(Ok(bytes)) => Ok(format!("{}+sha512.{}", version, hex::encode(bytes))),
        Some(Err(e)) => Err(Error::registry(format!(
            "Invalid integrity for version {}: {}",
            version, e
        ))),
        None => Ok(version.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_versions_from_object_keys() {
        let doc = json!({ "versions": { "1.0.0": {}, "1.1.0": {} } });
        assert_eq!(versions_from(&doc, "versions").unwrap(), ["1.0.0", "1.1.0"]);
    }

    #[test]
    fn test_versions_from_array() {
        let doc = json!({ "tags": ["4.0.0", 12, "4.1.0"] });
        assert_eq!(versions_from(&doc, "tags").unwrap(), ["4.0.0", "4.1.0"]);
    }

    #[test]
    fn test_versions_missing_field() {
        let err = versions_from(&json!({}), "versions").unwrap_err();
        assert!(matches!(err, Error::Registry { .. }));
    }

    #[test]
    fn test_tags_from() {
        let doc = json!({ "dist-tags": { "latest": "9.1.0", "next": "10.0.0-rc.1", "bad": 3 } });
        let tags = tags_from(&doc, "dist-tags").unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags["latest"], "9.1.0");
        assert!(tags_from(&doc, "latest").is_err());
    }

    #[test]
    fn test_latest_reference_with_integrity() {
        // base64 of bytes 0x01 0x02 0xff
        let doc = json!({ "version": "9.1.0", "dist": { "integrity": "sha512-AQL/" } });
        assert_eq!(latest_reference(&doc).unwrap(), "9.1.0+sha512.0102ff");
    }

    #[test]
    fn test_latest_reference_without_integrity() {
        let doc = json!({ "version": "1.22.22", "dist": { "shasum": "abc" } });
        assert_eq!(latest_reference(&doc).unwrap(), "1.22.22");
        assert!(latest_reference(&json!({ "dist": {} })).is_err());
    }

    #[test]
    fn test_registry_override() {
        let config = Config::default().with_home("/tmp/corepin");
        let client = NpmRegistryClient::new(&config).unwrap();
        assert_eq!(client.registry_url(), DEFAULT_NPM_REGISTRY);

        let mut config = Config::default();
        config.npm_registry = Some("https://mirror.example.com".into());
        let client = NpmRegistryClient::new(&config).unwrap();
        assert_eq!(client.package_url("pnpm"), "https://mirror.example.com/pnpm");
    }

    #[tokio::test]
    async fn test_url_registry_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.json");
        std::fs::write(
            &path,
            r#"{"latest":{"stable":"4.1.0","canary":"4.2.0-rc.1"},"tags":["4.0.0","4.1.0"]}"#,
        )
        .unwrap();

        let spec = RegistrySpec::Url {
            url: format!("file://{}", path.display()),
            fields: corepin_core::definitions::RegistryFields {
                tags: "latest".into(),
                versions: "tags".into(),
            },
        };
        let client = NpmRegistryClient::new(&Config::default()).unwrap();

        assert_eq!(
            client.fetch_available_versions(&spec).await.unwrap(),
            ["4.0.0", "4.1.0"]
        );
        assert_eq!(client.fetch_available_tags(&spec).await.unwrap()["canary"], "4.2.0-rc.1");
        assert_eq!(client.fetch_latest_stable_version(&spec).await.unwrap(), "4.1.0");
    }
}
