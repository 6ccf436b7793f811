//! Descriptors (requests) and locators (resolved references).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::definitions::{BinSpec, RangeSpec};
use crate::range;

/// A request for a tool: a name plus an exact version, range, dist-tag or,
/// for custom tools, a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    /// Tool name (e.g. "pnpm").
    pub name: String,
    /// Requested version, range, tag or URL.
    pub range: String,
}

impl Descriptor {
    /// Create a new descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            range: range.into(),
        }
    }

    /// Whether the range is a URL rather than a version expression.
    #[must_use]
    pub fn is_url(&self) -> bool {
        is_url(&self.range)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.range)
    }
}

/// A fully resolved tool reference. The reference is always an exact version
/// (optionally `version+hash`) or, for custom tools, the raw URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    /// Tool name.
    pub name: String,
    /// Exact version, `version+hash`, or URL.
    pub reference: String,
}

impl Locator {
    /// Create a new locator.
    #[must_use]
    pub fn new(name: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: reference.into(),
        }
    }

    /// The reference without its `+hash` suffix. URLs are returned as-is.
    #[must_use]
    pub fn version(&self) -> &str {
        if is_url(&self.reference) {
            &self.reference
        } else {
            range::strip_hash(&self.reference)
        }
    }

    /// The `algo.hex` hash suffix, if any.
    #[must_use]
    pub fn hash(&self) -> Option<&str> {
        if is_url(&self.reference) {
            return None;
        }
        self.reference.split_once('+').map(|(_, hash)| hash)
    }

    /// Return a copy whose hash suffix is replaced by `hash`. URL references
    /// are left untouched.
    #[must_use]
    pub fn with_hash(&self, hash: &str) -> Self {
        if is_url(&self.reference) {
            return self.clone();
        }
        Self {
            name: self.name.clone(),
            reference: format!("{}+{}", self.version(), hash),
        }
    }

    /// Descriptor requesting exactly this locator.
    #[must_use]
    pub fn to_descriptor(&self) -> Descriptor {
        Descriptor::new(self.name.clone(), self.reference.clone())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.reference)
    }
}

/// Result of installing a locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallInfo {
    /// Directory holding the installed package.
    pub location: PathBuf,
    /// Verified content hash (`algo.hex`).
    pub hash: String,
    /// Bin mapping discovered at install time, overriding the range spec's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin: Option<BinSpec>,
}

/// A resolved, installed tool ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSpec {
    /// Locator carrying the freshly verified hash.
    pub locator: Locator,
    /// Install metadata.
    pub info: InstallInfo,
    /// Range spec governing this version.
    pub spec: RangeSpec,
}

impl InstallSpec {
    /// Bin mapping to use when running this install.
    #[must_use]
    pub fn bin(&self) -> Option<&BinSpec> {
        self.info.bin.as_ref().or(self.spec.bin.as_ref())
    }

    /// Location of `binary` inside the install.
    ///
    /// A bin map names the file for each binary. A bin list means the
    /// download itself is the entry point, so the binary lives under the
    /// downloaded file's name; that only works for `.js` downloads.
    #[must_use]
    pub fn bin_path(&self, binary: &str) -> Option<PathBuf> {
        match self.bin()? {
            BinSpec::Map(map) => map
                .get(binary)
                .map(|relative| self.info.location.join(relative)),
            BinSpec::List(names) => {
                if !names.iter().any(|name| name == binary) {
                    return None;
                }
                let file_name = url_file_name(&self.spec.url)?;
                file_name
                    .ends_with(".js")
                    .then(|| self.info.location.join(file_name))
            }
        }
    }
}

/// Last path segment of a URL, ignoring any query or fragment.
#[must_use]
pub fn url_file_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let path = path.split_once("://").map_or(path, |(_, rest)| rest);
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

/// Split `name@range`. Scoped names (`@scope/name@1.0.0`) keep their leading
/// `@`; the range is `None` when absent or empty.
#[must_use]
pub fn split_spec(raw: &str) -> (&str, Option<&str>) {
    match raw.char_indices().skip(1).find(|(_, c)| *c == '@') {
        Some((index, _)) => {
            let range = &raw[index + 1..];
            (&raw[..index], (!range.is_empty()).then_some(range))
        }
        None => (raw, None),
    }
}

/// Whether a reference looks like a URL (`scheme://...`).
#[must_use]
pub fn is_url(reference: &str) -> bool {
    reference.split_once("://").is_some_and(|(scheme, rest)| {
        !scheme.is_empty()
            && !rest.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_display() {
        assert_eq!(Descriptor::new("pnpm", "^8.0.0").to_string(), "pnpm@^8.0.0");
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://repo.example.com/yarn.js"));
        assert!(is_url("file:///tmp/pm.tgz"));
        assert!(!is_url("1.22.19"));
        assert!(!is_url("latest"));
        assert!(!is_url("://nothing"));
    }

    #[test]
    fn test_split_spec() {
        assert_eq!(split_spec("pnpm@8.6.0"), ("pnpm", Some("8.6.0")));
        assert_eq!(split_spec("pnpm"), ("pnpm", None));
        assert_eq!(split_spec("pnpm@"), ("pnpm", None));
        assert_eq!(split_spec("@scope/pm@1.0.0"), ("@scope/pm", Some("1.0.0")));
        assert_eq!(split_spec("@scope/pm"), ("@scope/pm", None));
        assert_eq!(
            split_spec("mypm@https://example.com/a@b.tgz"),
            ("mypm", Some("https://example.com/a@b.tgz"))
        );
    }

    #[test]
    fn test_locator_hash_handling() {
        let locator = Locator::new("yarn", "1.22.19+sha512.abc");
        assert_eq!(locator.version(), "1.22.19");
        assert_eq!(locator.hash(), Some("sha512.abc"));

        let rehashed = locator.with_hash("sha512.def");
        assert_eq!(rehashed.reference, "1.22.19+sha512.def");

        let bare = Locator::new("yarn", "1.22.19").with_hash("sha1.123");
        assert_eq!(bare.reference, "1.22.19+sha1.123");
    }

    fn install(url: &str, bin: BinSpec) -> InstallSpec {
        InstallSpec {
            locator: Locator::new("yarn", "4.1.0"),
            info: InstallInfo {
                location: PathBuf::from("/cache/yarn/4.1.0"),
                hash: "sha512.abc".into(),
                bin: None,
            },
            spec: RangeSpec {
                url: url.into(),
                bin: Some(bin),
                registry: crate::definitions::RegistrySpec::Npm {
                    package: "yarn".into(),
                },
            },
        }
    }

    #[test]
    fn test_bin_path_from_map() {
        let mut map = indexmap::IndexMap::new();
        map.insert("yarn".to_string(), "./bin/yarn.js".to_string());
        let spec = install("https://example.com/yarn-{}.tgz", BinSpec::Map(map));

        assert_eq!(
            spec.bin_path("yarn"),
            Some(PathBuf::from("/cache/yarn/4.1.0/./bin/yarn.js"))
        );
        assert_eq!(spec.bin_path("yarnpkg"), None);
    }

    #[test]
    fn test_bin_path_from_list() {
        let bin = BinSpec::List(vec!["yarn".into(), "yarnpkg".into()]);
        let spec = install("https://repo.example.com/{}/yarn.js", bin.clone());
        assert_eq!(
            spec.bin_path("yarnpkg"),
            Some(PathBuf::from("/cache/yarn/4.1.0/yarn.js"))
        );

        let archive = install("https://example.com/yarn.tgz", bin);
        assert_eq!(archive.bin_path("yarn"), None);
    }

    #[test]
    fn test_url_file_name() {
        assert_eq!(url_file_name("https://a.com/x/yarn.js?x=1"), Some("yarn.js"));
        assert_eq!(url_file_name("file:///tmp/pm.tgz"), Some("pm.tgz"));
        assert_eq!(url_file_name("https://a.com/"), None);
    }

    #[test]
    fn test_url_locator_never_hashed() {
        let locator = Locator::new("mypm", "https://example.com/pm-1.0.0+build.tgz");
        assert_eq!(locator.hash(), None);
        assert_eq!(locator.with_hash("sha512.abc"), locator);
        assert_eq!(locator.version(), "https://example.com/pm-1.0.0+build.tgz");
    }
}
