//! `package.json` backed project specs.
//!
//! The loader walks from the working directory towards the filesystem root.
//! Each `package.json` it meets becomes the current selection; the walk stops
//! at the first one declaring `packageManager`. Directories that are packages
//! inside `node_modules` are skipped so that running a tool from within a
//! dependency still honors the enclosing project.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::definitions::Definitions;
use crate::descriptor::{self, Descriptor, InstallSpec};
use crate::provider::{ProjectSpecOutcome, ProjectSpecs};
use crate::range;
use crate::{Error, Result};

const MANIFEST: &str = "package.json";
const FIELD: &str = "packageManager";
const DEFAULT_INDENT: &str = "  ";

/// Project specs read from and written to `package.json`.
#[derive(Debug, Clone)]
pub struct PackageJsonSpecs {
    definitions: Arc<Definitions>,
    unsafe_custom_urls: bool,
}

impl PackageJsonSpecs {
    /// Loader validating pins against `definitions`.
    #[must_use]
    pub fn new(definitions: Arc<Definitions>, unsafe_custom_urls: bool) -> Self {
        Self {
            definitions,
            unsafe_custom_urls,
        }
    }
}

#[async_trait]
impl ProjectSpecs for PackageJsonSpecs {
    async fn load(&self, cwd: &Path) -> Result<ProjectSpecOutcome> {
        let mut selection: Option<(PathBuf, Map<String, Value>)> = None;

        for dir in cwd.ancestors() {
            if is_node_modules_package(dir) {
                continue;
            }
            let manifest = dir.join(MANIFEST);
            let Some(content) = read_optional(&manifest).await? else {
                continue;
            };
            let Ok(Value::Object(data)) = serde_json::from_str::<Value>(&content) else {
                return Err(Error::invalid_project_spec(
                    manifest,
                    "expected a JSON object",
                ));
            };
            let pinned = pin_field(&data).is_some();
            selection = Some((manifest, data));
            if pinned {
                break;
            }
        }

        let Some((manifest, data)) = selection else {
            return Ok(ProjectSpecOutcome::NoProject);
        };

        match pin_field(&data) {
            None => {
                let boundary = manifest
                    .parent()
                    .map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);
                Ok(ProjectSpecOutcome::NoSpec { boundary })
            }
            Some(Value::String(raw)) => {
                let descriptor =
                    parse_spec(raw, &manifest, &self.definitions, self.unsafe_custom_urls)?;
                Ok(ProjectSpecOutcome::Found {
                    descriptor,
                    path: manifest,
                })
            }
            Some(_) => Err(Error::invalid_project_spec(
                manifest,
                "\"packageManager\" must be a string",
            )),
        }
    }

    async fn write(&self, boundary: &Path, install: &InstallSpec) -> Result<()> {
        let manifest = boundary.join(MANIFEST);
        let content = read_optional(&manifest).await?.unwrap_or_default();

        let mut data = if content.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str::<Value>(&content)
                .map_err(|e| Error::invalid_project_spec(&manifest, e.to_string()))?
        };
        let Some(object) = data.as_object_mut() else {
            return Err(Error::invalid_project_spec(
                manifest,
                "expected a JSON object",
            ));
        };
        let previous = object.insert(
            FIELD.to_string(),
            Value::String(install.locator.to_string()),
        );

        let mut rendered = render(&data, detect_indent(&content))
            .map_err(|e| Error::invalid_project_spec(&manifest, e))?;
        if content.contains("\r\n") {
            rendered = rendered.replace('\n', "\r\n");
        }

        tokio::fs::write(&manifest, rendered)
            .await
            .map_err(|e| Error::io(e, Some(manifest.clone()), "write package.json"))?;
        debug!(
            path = %manifest.display(),
            previous = ?previous,
            locator = %install.locator,
            "Wrote packageManager field"
        );
        Ok(())
    }
}

/// Parse a `packageManager` value found in `source`.
///
/// Supported tools must be pinned to an exact version; URLs are only accepted
/// for custom tools unless `unsafe_custom_urls` is set.
///
/// # Errors
///
/// - [`Error::InvalidProjectSpec`] for a missing or non-exact version
/// - [`Error::IllegalCustomUrl`] for a URL pin of a supported tool
/// - [`Error::UnsupportedPackageManager`] for an unknown tool without a URL
pub fn parse_spec(
    raw: &str,
    source: &Path,
    definitions: &Definitions,
    unsafe_custom_urls: bool,
) -> Result<Descriptor> {
    let (name, range) = descriptor::split_spec(raw.trim());
    let Some(range) = range else {
        return Err(Error::invalid_project_spec(
            source,
            format!("no version specified for {} in \"packageManager\"", name),
        ));
    };

    if descriptor::is_url(range) {
        if definitions.is_supported(name) && !unsafe_custom_urls {
            return Err(Error::IllegalCustomUrl {
                descriptor: raw.to_string(),
            });
        }
    } else {
        if !range::is_exact(range) {
            return Err(Error::invalid_project_spec(
                source,
                format!("invalid package manager specification ({}); expected a semver version", raw),
            ));
        }
        if let Some((_, hash)) = range.split_once('+')
            && !hash
                .split_once('.')
                .is_some_and(|(algorithm, digest)| !algorithm.is_empty() && !digest.is_empty())
        {
            return Err(Error::invalid_project_spec(
                source,
                format!(
                    "invalid package manager specification ({}); expected <version>+<algorithm>.<hex digest>",
                    raw
                ),
            ));
        }
        if !definitions.is_supported(name) {
            return Err(Error::unsupported(name));
        }
    }

    Ok(Descriptor::new(name, range))
}

/// The `packageManager` value, treating `null` and `""` as unset.
fn pin_field(data: &Map<String, Value>) -> Option<&Value> {
    data.get(FIELD)
        .filter(|value| !value.is_null() && value.as_str() != Some(""))
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(e, Some(path.to_path_buf()), "read package.json")),
    }
}

/// Whether `dir` is a package directory directly inside `node_modules`,
/// scoped or not.
fn is_node_modules_package(dir: &Path) -> bool {
    let mut components = dir
        .components()
        .rev()
        .filter_map(|component| component.as_os_str().to_str());

    let Some(name) = components.next() else {
        return false;
    };
    if name.starts_with('@') {
        return false;
    }
    match components.next() {
        Some("node_modules") => true,
        Some(scope) if scope.starts_with('@') => components.next() == Some("node_modules"),
        _ => false,
    }
}

fn detect_indent(content: &str) -> &str {
    content
        .lines()
        .find_map(|line| {
            let rest = line.trim_start_matches([' ', '\t']);
            let width = line.len() - rest.len();
            (width > 0 && !rest.is_empty()).then(|| &line[..width])
        })
        .unwrap_or(DEFAULT_INDENT)
}

fn render(data: &Value, indent: &str) -> std::result::Result<String, String> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    data.serialize(&mut serializer).map_err(|e| e.to_string())?;
    let mut rendered = String::from_utf8(buffer).map_err(|e| e.to_string())?;
    rendered.push('\n');
    Ok(rendered)
}
