//! Install cache: downloads, verifies and unpacks tool versions.
//!
//! Layout is `<root>/<name>/<version>` for registry versions and
//! `<root>/<name>/url-<digest>` for custom URLs. A directory only counts as
//! installed once its `.corepin.json` metadata exists; installs are staged
//! next to the destination and renamed into place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use corepin_core::descriptor::{is_url, url_file_name};
use corepin_core::range::{self, VersionRange};
use corepin_core::{
    BinSpec, Config, Descriptor, Error, InstallInfo, Installer, Locator, RangeSpec, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use tracing::{debug, info, instrument, warn};

use crate::extract;
use crate::http::HttpClient;
use crate::registry::DEFAULT_NPM_REGISTRY;

/// Metadata file marking a completed install.
const METADATA_FILE: &str = ".corepin.json";

/// Algorithm used when the locator carries no hash.
const DEFAULT_ALGORITHM: &str = "sha512";

#[derive(Debug, Serialize, Deserialize)]
struct InstallMetadata {
    locator: String,
    hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bin: Option<BinSpec>,
}

/// [`Installer`] unpacking registry tarballs into the corepin home.
#[derive(Debug, Clone)]
pub struct TarballInstaller {
    root: PathBuf,
    http: HttpClient,
    npm_registry: Option<String>,
}

impl TarballInstaller {
    /// Create an installer rooted at the configured install directory.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            root: config.install_dir(),
            http: HttpClient::new()?,
            npm_registry: config.npm_registry.clone(),
        })
    }

    /// Install cache root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `locator`'s install.
    #[must_use]
    pub fn install_dir(&self, locator: &Locator) -> PathBuf {
        let leaf = if is_url(&locator.reference) {
            let digest = hex::encode(Sha256::digest(locator.reference.as_bytes()));
            format!("url-{}", &digest[..16])
        } else {
            locator.version().to_string()
        };
        self.root.join(&locator.name).join(leaf)
    }

    /// Point tarball URLs hosted on the public registry at the configured
    /// mirror.
    fn rewrite_url(&self, url: String) -> String {
        match (&self.npm_registry, url.strip_prefix(DEFAULT_NPM_REGISTRY)) {
            (Some(mirror), Some(rest)) => format!("{}{}", mirror, rest),
            _ => url,
        }
    }

    async fn download(&self, locator: &Locator, spec: &RangeSpec) -> Result<Vec<u8>> {
        let url = if is_url(&locator.reference) {
            locator.reference.clone()
        } else {
            spec.download_url(locator.version())
        };
        let url = self.rewrite_url(url);

        info!(tool = %locator.name, %url, "Downloading");
        self.http
            .get_bytes(&url, None)
            .await
            .map_err(|e| Error::install(&locator.name, &locator.reference, e.to_string()))
    }
}

#[async_trait]
impl Installer for TarballInstaller {
    #[instrument(skip(self), fields(tool = %descriptor.name, range = %descriptor.range))]
    async fn find_installed_version(&self, descriptor: &Descriptor) -> Result<Option<String>> {
        let Some(filter) = VersionRange::parse(&descriptor.range) else {
            return Ok(None);
        };

        let tool_dir = self.root.join(&descriptor.name);
        let entries = match std::fs::read_dir(&tool_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(e, Some(tool_dir), "list installed versions")),
        };

        let mut versions: Vec<_> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().join(METADATA_FILE).is_file())
            .filter_map(|entry| entry.file_name().to_str().and_then(range::parse_exact))
            .filter(|version| filter.satisfies(version))
            .collect();
        range::sort_descending(&mut versions);

        let found = versions.first().map(ToString::to_string);
        debug!(?found, "Scanned install cache");
        Ok(found)
    }

    #[instrument(skip(self, spec), fields(tool = %locator.name, reference = %locator.reference))]
    async fn install_version(&self, locator: &Locator, spec: &RangeSpec) -> Result<InstallInfo> {
        let dest = self.install_dir(locator);
        let expected = locator
            .hash()
            .map(|hash| split_hash(locator, hash))
            .transpose()?;

        if let Some(metadata) = read_metadata(&dest)? {
            debug!(?dest, "Using cached install");
            if let Some((algorithm, digest)) = expected
                && let Some((cached_algorithm, cached_digest)) = metadata.hash.split_once('.')
                && algorithm == cached_algorithm
                && digest != cached_digest
            {
                return Err(mismatch(locator, digest, cached_digest));
            }
            return Ok(InstallInfo {
                location: dest,
                hash: metadata.hash,
                bin: metadata.bin,
            });
        }

        let data = self.download(locator, spec).await?;

        let algorithm = expected.map_or(DEFAULT_ALGORITHM, |(algorithm, _)| algorithm);
        let digest = hex_digest(algorithm, &data).ok_or_else(|| {
            Error::install(
                &locator.name,
                &locator.reference,
                format!("Unsupported hash algorithm '{}'", algorithm),
            )
        })?;
        if let Some((_, expected_digest)) = expected
            && expected_digest != digest
        {
            return Err(mismatch(locator, expected_digest, &digest));
        }
        let hash = format!("{}.{}", algorithm, digest);

        let url = spec.download_url(locator.version());
        let file_name = if is_url(&locator.reference) {
            url_file_name(&locator.reference)
        } else {
            url_file_name(&url)
        }
        .unwrap_or("package.tgz")
        .to_string();

        let metadata = InstallMetadata {
            locator: locator.to_string(),
            hash,
            bin: None,
        };
        let metadata = stage(&dest, &data, &file_name, spec, metadata)
            .map_err(|e| Error::install(&locator.name, &locator.reference, e.to_string()))?;

        info!(tool = %locator.name, location = ?dest, hash = %metadata.hash, "Installed");
        Ok(InstallInfo {
            location: dest,
            hash: metadata.hash,
            bin: metadata.bin,
        })
    }
}

/// Unpack into a sibling staging directory, write metadata, then move the
/// result into place. Losing a race to a concurrent install adopts the
/// winner's metadata.
fn stage(
    dest: &Path,
    data: &[u8],
    file_name: &str,
    spec: &RangeSpec,
    mut metadata: InstallMetadata,
) -> std::io::Result<InstallMetadata> {
    let parent = dest
        .parent()
        .ok_or_else(|| std::io::Error::other("install directory has no parent"))?;
    std::fs::create_dir_all(parent)?;

    let leaf = dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_dir = parent.join(format!(".{}.tmp-{}", leaf, std::process::id()));
    if temp_dir.exists() {
        std::fs::remove_dir_all(&temp_dir)?;
    }
    std::fs::create_dir_all(&temp_dir)?;

    let staged = (|| -> std::io::Result<()> {
        if extract::is_tarball(file_name) {
            extract::unpack_tarball(data, &temp_dir)?;
        } else {
            extract::write_file(data, &temp_dir, file_name)?;
        }
        if spec.bin.is_none() {
            metadata.bin = discover_bin(&temp_dir);
        }
        let rendered = serde_json::to_string_pretty(&metadata).map_err(std::io::Error::other)?;
        std::fs::write(temp_dir.join(METADATA_FILE), rendered)
    })();

    if let Err(e) = staged {
        let _ = std::fs::remove_dir_all(&temp_dir);
        return Err(e);
    }

    // A directory without metadata is a leftover from an interrupted install.
    if dest.exists() && !dest.join(METADATA_FILE).is_file() {
        std::fs::remove_dir_all(dest)?;
    }

    match std::fs::rename(&temp_dir, dest) {
        Ok(()) => Ok(metadata),
        Err(e) => {
            let _ = std::fs::remove_dir_all(&temp_dir);
            match read_metadata_file(dest) {
                Some(existing) => {
                    warn!(?dest, "Install finished concurrently, reusing it");
                    Ok(existing)
                }
                None => Err(e),
            }
        }
    }
}

/// Bin mapping from an unpacked package's `package.json`. A string `bin`
/// provides one binary named after the package.
fn discover_bin(dir: &Path) -> Option<BinSpec> {
    let content = std::fs::read_to_string(dir.join("package.json")).ok()?;
    let manifest: Value = serde_json::from_str(&content).ok()?;

    match manifest.get("bin")? {
        Value::String(path) => {
            let name = manifest.get("name")?.as_str()?;
            let name = name.rsplit('/').next().unwrap_or(name);
            Some(BinSpec::Map(
                std::iter::once((name.to_string(), path.clone())).collect(),
            ))
        }
        Value::Object(map) => Some(BinSpec::Map(
            map.iter()
                .filter_map(|(name, path)| path.as_str().map(|p| (name.clone(), p.to_string())))
                .collect(),
        )),
        _ => None,
    }
}

fn read_metadata(dir: &Path) -> Result<Option<InstallMetadata>> {
    let path = dir.join(METADATA_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(e, Some(path), "read install metadata")),
    };
    match serde_json::from_str(&content) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) => {
            warn!(?path, error = %e, "Ignoring corrupt install metadata");
            Ok(None)
        }
    }
}

fn read_metadata_file(dir: &Path) -> Option<InstallMetadata> {
    let content = std::fs::read_to_string(dir.join(METADATA_FILE)).ok()?;
    serde_json::from_str(&content).ok()
}

/// Split `algo.hex`.
fn split_hash<'a>(locator: &Locator, hash: &'a str) -> Result<(&'a str, &'a str)> {
    hash.split_once('.')
        .filter(|(algorithm, digest)| !algorithm.is_empty() && !digest.is_empty())
        .ok_or_else(|| {
            Error::install(
                &locator.name,
                &locator.reference,
                format!("Malformed hash '{}', expected <algorithm>.<hex digest>", hash),
            )
        })
}

/// Hex digest of `data`, `None` for algorithms outside the sha2 family.
fn hex_digest(algorithm: &str, data: &[u8]) -> Option<String> {
    Some(match algorithm {
        "sha224" => hex::encode(Sha224::digest(data)),
        "sha256" => hex::encode(Sha256::digest(data)),
        "sha384" => hex::encode(Sha384::digest(data)),
        "sha512" => hex::encode(Sha512::digest(data)),
        _ => return None,
    })
}

fn mismatch(locator: &Locator, expected: &str, actual: &str) -> Error {
    Error::install(
        &locator.name,
        &locator.reference,
        format!("Mismatch hashes. Expected {}, got {}", expected, actual),
    )
}
