//! Collaborator traits consumed by the engine.
//!
//! The engine owns resolution and orchestration only. Registry access, the
//! install cache, project manifests, the Last-Known-Good file and process
//! execution sit behind these traits so that each can be swapped (network
//! clients in `corepin-tools-npm`, the process runner in the CLI, in-memory
//! doubles in tests).

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::Result;
use crate::definitions::{RangeSpec, RegistrySpec};
use crate::descriptor::{Descriptor, InstallInfo, InstallSpec, Locator};
use crate::store::LastKnownGood;

/// Source of version lists, tag maps and latest-stable lookups.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// All versions published to `registry`.
    async fn fetch_available_versions(&self, registry: &RegistrySpec) -> Result<Vec<String>>;

    /// Tag name to exact version.
    async fn fetch_available_tags(
        &self,
        registry: &RegistrySpec,
    ) -> Result<HashMap<String, String>>;

    /// Latest stable release, possibly hash-suffixed (`version+algo.hex`).
    async fn fetch_latest_stable_version(&self, source: &RegistrySpec) -> Result<String>;
}

/// Install cache.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Highest installed version of `descriptor.name` satisfying its range.
    async fn find_installed_version(&self, descriptor: &Descriptor) -> Result<Option<String>>;

    /// Ensure `locator` is installed and return its verified content hash.
    ///
    /// # Errors
    ///
    /// Fails when the download, hash verification or extraction fails.
    async fn install_version(&self, locator: &Locator, spec: &RangeSpec) -> Result<InstallInfo>;
}

/// Outcome of looking for a project's declared tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectSpecOutcome {
    /// No project boundary above the working directory.
    NoProject,
    /// A project exists but pins no tool.
    NoSpec {
        /// Directory holding the project's manifest.
        boundary: PathBuf,
    },
    /// The project pins a tool.
    Found {
        /// The declared tool and range.
        descriptor: Descriptor,
        /// Manifest the pin was read from.
        path: PathBuf,
    },
}

/// Reader and writer of project pins.
#[async_trait]
pub trait ProjectSpecs: Send + Sync {
    /// Walk up from `cwd` looking for a project pin.
    async fn load(&self, cwd: &Path) -> Result<ProjectSpecOutcome>;

    /// Record `install` as the pin of the project rooted at `boundary`.
    async fn write(&self, boundary: &Path, install: &InstallSpec) -> Result<()>;
}

/// Persistence for the Last-Known-Good mapping.
///
/// Snapshots are read and written whole. Concurrent writers race and the last
/// one wins.
#[async_trait]
pub trait LastKnownGoodStore: Send + Sync {
    /// Current snapshot. A missing or corrupted file yields an empty one.
    async fn load(&self) -> Result<LastKnownGood>;

    /// Replace the stored snapshot.
    async fn save(&self, snapshot: &LastKnownGood) -> Result<()>;
}

/// Process execution.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run `binary` from `install` with `args`, returning its exit code.
    async fn run(&self, install: &InstallSpec, binary: &str, args: &[String]) -> Result<i32>;
}
