//! Package-manager definition table.
//!
//! The table maps each supported tool to its version-range partitions, the
//! registry each partition is listed in, a static default version and the
//! transparent-command rules. It is parsed and validated once at startup and
//! shared read-only afterwards.
//!
//! ## Structure
//!
//! ```json
//! {
//!   "definitions": {
//!     "yarn": {
//!       "default": "1.22.22",
//!       "fetchLatestFrom": { "type": "npm", "package": "yarn" },
//!       "transparent": { "default": "4.6.0", "commands": [["yarn", "init"]] },
//!       "ranges": {
//!         "<2.0.0": { "url": "...", "bin": { "yarn": "./bin/yarn.js" }, "registry": { ... } },
//!         ">=2.0.0": { "url": "...", "bin": ["yarn", "yarnpkg"], "registry": { ... } }
//!       }
//!     }
//!   }
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::range::{self, VersionRange};
use crate::{Error, Result};

/// Definition table shipped with corepin.
const BUILTIN_DEFINITIONS: &str = include_str!("definitions.json");

/// Where version lists, tag maps and latest-stable lookups come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RegistrySpec {
    /// A package on an npm registry.
    Npm {
        /// Package name (e.g. "pnpm", "@yarnpkg/cli-dist").
        package: String,
    },
    /// A JSON document listing tags and versions.
    Url {
        /// Document URL.
        url: String,
        /// Which document fields hold the tags and versions.
        fields: RegistryFields,
    },
}

/// Field names inside a URL registry document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryFields {
    /// Field holding the tag map.
    pub tags: String,
    /// Field holding the version list.
    pub versions: String,
}

/// Binaries provided by a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinSpec {
    /// Binary names; the download itself is the executable.
    List(Vec<String>),
    /// Binary name to path inside the package.
    Map(IndexMap<String, String>),
}

impl BinSpec {
    /// Whether the package provides `binary`.
    #[must_use]
    pub fn contains(&self, binary: &str) -> bool {
        match self {
            Self::List(names) => names.iter().any(|name| name == binary),
            Self::Map(map) => map.contains_key(binary),
        }
    }

    /// All binary names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::List(names) => names.iter().map(String::as_str).collect(),
            Self::Map(map) => map.keys().map(String::as_str).collect(),
        }
    }
}

/// Install and registry metadata for one version range of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSpec {
    /// Download URL template; `{}` is replaced by the version.
    pub url: String,
    /// Binaries provided. `None` for custom tools until the package is
    /// inspected at install time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin: Option<BinSpec>,
    /// Where versions and tags for this range are listed.
    pub registry: RegistrySpec,
}

impl RangeSpec {
    /// Spec synthesized for a custom URL locator.
    #[must_use]
    pub fn for_custom_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            registry: RegistrySpec::Url {
                url: url.clone(),
                fields: RegistryFields {
                    tags: String::new(),
                    versions: String::new(),
                },
            },
            url,
            bin: None,
        }
    }

    /// Download URL for `version`.
    #[must_use]
    pub fn download_url(&self, version: &str) -> String {
        self.url.replace("{}", version)
    }
}

/// Invocations allowed to run without a matching project pin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransparentRules {
    /// Patterns: binary name followed by a leading argument prefix.
    #[serde(default)]
    pub commands: Vec<Vec<String>>,
    /// Default version for matched invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl TransparentRules {
    /// Whether `binary args...` starts with one of the declared patterns.
    #[must_use]
    pub fn matches(&self, binary: &str, args: &[String]) -> bool {
        self.commands.iter().any(|pattern| match pattern.split_first() {
            Some((name, prefix)) => {
                name == binary
                    && prefix.len() <= args.len()
                    && prefix.iter().zip(args).all(|(segment, arg)| segment == arg)
            }
            None => false,
        })
    }
}

/// Static configuration for one supported tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    /// Version used when fetching the latest release is disabled.
    pub default: String,
    /// Where the latest stable version is looked up.
    pub fetch_latest_from: RegistrySpec,
    /// Transparent-command rules.
    #[serde(default)]
    pub transparent: TransparentRules,
    /// Range key to spec, in declaration order.
    pub ranges: IndexMap<String, RangeSpec>,
}

impl Definition {
    /// The last declared range, used for tag lookups.
    #[must_use]
    pub fn last_range(&self) -> Option<(&String, &RangeSpec)> {
        self.ranges.last()
    }

    /// Whether any range provides `binary`.
    #[must_use]
    pub fn provides(&self, binary: &str) -> bool {
        self.ranges
            .values()
            .any(|spec| spec.bin.as_ref().is_some_and(|bin| bin.contains(binary)))
    }
}

/// Validated definition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definitions {
    definitions: IndexMap<String, Definition>,
}

impl Definitions {
    /// Load the table shipped with corepin.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_DEFINITIONS)
    }

    /// Parse and validate a table from JSON.
    pub fn from_json(content: &str) -> Result<Self> {
        let definitions: Self = serde_json::from_str(content).map_err(|e| {
            Error::configuration(format!("Failed to parse definition table: {}", e))
        })?;
        definitions.validate()?;
        Ok(definitions)
    }

    /// Load a table from a file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::io(e, Some(path.to_path_buf()), "read definition table")
        })?;
        Self::from_json(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.definitions.is_empty() {
            return Err(Error::configuration("Definition table is empty"));
        }

        for (name, definition) in &self.definitions {
            if definition.ranges.is_empty() {
                return Err(Error::configuration(format!(
                    "Definition for {} declares no ranges",
                    name
                )));
            }
            if let Some(key) = definition
                .ranges
                .keys()
                .find(|key| VersionRange::parse(key).is_none())
            {
                return Err(Error::configuration(format!(
                    "Definition for {} has an invalid range key '{}'",
                    name, key
                )));
            }
            if !range::is_exact(&definition.default) {
                return Err(Error::configuration(format!(
                    "Default version '{}' for {} is not an exact version",
                    definition.default, name
                )));
            }
            if let Some(default) = &definition.transparent.default {
                if !range::is_exact(default) {
                    return Err(Error::configuration(format!(
                        "Transparent default '{}' for {} is not an exact version",
                        default, name
                    )));
                }
            }
            if definition.transparent.commands.iter().any(Vec::is_empty) {
                return Err(Error::configuration(format!(
                    "Definition for {} has an empty transparent command",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Look up a tool's definition.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Definition> {
        self.definitions.get(name)
    }

    /// Whether `name` is a supported tool.
    #[must_use]
    pub fn is_supported(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Find the tool providing `binary`.
    #[must_use]
    pub fn tool_for_binary(&self, binary: &str) -> Option<&str> {
        self.definitions
            .iter()
            .find(|(_, definition)| definition.provides(binary))
            .map(|(name, _)| name.as_str())
    }

    /// Supported tool names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }
}
