//! Last-Known-Good persistence.
//!
//! The file is a JSON object mapping tool names to exact versions:
//!
//! ```json
//! {
//!   "pnpm": "9.15.4+sha512.0a1b...",
//!   "yarn": "1.22.22"
//! }
//! ```
//!
//! A missing file is an empty store. A file that fails to parse is also an
//! empty store; non-string values are dropped on load.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::provider::LastKnownGoodStore;
use crate::{Error, Result};

/// Tool name to most recently activated version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LastKnownGood {
    entries: BTreeMap<String, String>,
}

impl LastKnownGood {
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a snapshot, tolerating corruption (including invalid UTF-8).
    #[must_use]
    pub fn parse(content: impl AsRef<[u8]>) -> Self {
        let Ok(serde_json::Value::Object(map)) = serde_json::from_slice(content.as_ref()) else {
            return Self::default();
        };
        let entries = map
            .into_iter()
            .filter_map(|(name, value)| match value {
                serde_json::Value::String(version) => Some((name, version)),
                _ => None,
            })
            .collect();
        Self { entries }
    }

    /// Pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut content = serde_json::to_string_pretty(&self.entries).map_err(|e| {
            Error::configuration(format!("Failed to serialize last known good: {}", e))
        })?;
        content.push('\n');
        Ok(content)
    }

    /// Stored version for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Set the version for `name`, returning whether the value changed.
    pub fn set(&mut self, name: impl Into<String>, reference: impl Into<String>) -> bool {
        let reference = reference.into();
        let name = name.into();
        if self.entries.get(&name) == Some(&reference) {
            return false;
        }
        self.entries.insert(name, reference);
        true
    }

    /// Number of recorded tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Last-Known-Good store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store reading and writing `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LastKnownGoodStore for FileStore {
    async fn load(&self) -> Result<LastKnownGood> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LastKnownGood::default());
            }
            Err(e) => {
                return Err(Error::io(
                    e,
                    Some(self.path.clone()),
                    "read last known good",
                ));
            }
        };
        Ok(LastKnownGood::parse(&content))
    }

    async fn save(&self, snapshot: &LastKnownGood) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(e, Some(parent.to_path_buf()), "create directory"))?;
        }
        let content = snapshot.to_json()?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| Error::io(e, Some(self.path.clone()), "write last known good"))?;
        debug!(path = %self.path.display(), entries = snapshot.len(), "Saved last known good");
        Ok(())
    }
}
