//! In-memory collaborators for engine tests.
//!
//! Enabled for this crate's own tests and, through the `test-utils` feature,
//! for integration tests and downstream crates.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::Config;
use crate::definitions::{Definitions, RangeSpec, RegistrySpec};
use crate::descriptor::{self, Descriptor, InstallInfo, InstallSpec, Locator};
use crate::engine::Engine;
use crate::provider::{
    Installer, LastKnownGoodStore, ProjectSpecOutcome, ProjectSpecs, RegistryClient, Runner,
};
use crate::range::{self, VersionRange};
use crate::store::LastKnownGood;
use crate::{Error, Result};

/// Hash reported by [`FakeInstaller`] for every install.
pub const FIXTURE_HASH: &str = "sha512.f1f1f1";

/// Definition table used by engine tests.
///
/// `yarn` is split into a `1.x` range listed under the npm package `yarn` and
/// a `>=2.0.0` range listed at `https://repo.example.com/tags`.
pub const FIXTURE_DEFINITIONS: &str = r#"{
  "definitions": {
    "npm": {
      "default": "10.9.2",
      "fetchLatestFrom": { "type": "npm", "package": "npm" },
      "transparent": { "commands": [["npm", "exec"], ["npx"]] },
      "ranges": {
        "*": {
          "url": "https://registry.example.com/npm/-/npm-{}.tgz",
          "bin": { "npm": "./bin/npm-cli.js", "npx": "./bin/npx-cli.js" },
          "registry": { "type": "npm", "package": "npm" }
        }
      }
    },
    "pnpm": {
      "default": "9.1.0",
      "fetchLatestFrom": { "type": "npm", "package": "pnpm" },
      "transparent": { "commands": [["pnpm", "init"], ["pnpx"], ["pnpm", "dlx"]] },
      "ranges": {
        ">=6.0.0": {
          "url": "https://registry.example.com/pnpm/-/pnpm-{}.tgz",
          "bin": { "pnpm": "./bin/pnpm.cjs", "pnpx": "./bin/pnpx.cjs" },
          "registry": { "type": "npm", "package": "pnpm" }
        }
      }
    },
    "yarn": {
      "default": "1.22.22",
      "fetchLatestFrom": { "type": "npm", "package": "yarn" },
      "transparent": { "default": "4.1.0", "commands": [["yarn", "init"], ["yarn", "dlx"]] },
      "ranges": {
        "1.x": {
          "url": "https://registry.example.com/yarn/-/yarn-{}.tgz",
          "bin": { "yarn": "./bin/yarn.js", "yarnpkg": "./bin/yarn.js" },
          "registry": { "type": "npm", "package": "yarn" }
        },
        ">=2.0.0": {
          "url": "https://repo.example.com/{}/yarn.js",
          "bin": ["yarn", "yarnpkg"],
          "registry": {
            "type": "url",
            "url": "https://repo.example.com/tags",
            "fields": { "tags": "latest", "versions": "tags" }
          }
        }
      }
    }
  }
}"#;

/// Parse [`FIXTURE_DEFINITIONS`].
///
/// # Panics
///
/// Panics if the fixture table is invalid.
#[must_use]
pub fn fixture_definitions() -> Definitions {
    Definitions::from_json(FIXTURE_DEFINITIONS)
        .unwrap_or_else(|e| panic!("fixture definitions are invalid: {e}"))
}

/// Key identifying a registry in the fakes: the npm package or the URL.
#[must_use]
pub fn registry_key(registry: &RegistrySpec) -> &str {
    match registry {
        RegistrySpec::Npm { package } => package.as_str(),
        RegistrySpec::Url { url, .. } => url.as_str(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct RegistryData {
    versions: HashMap<String, Vec<String>>,
    tags: HashMap<String, HashMap<String, String>>,
    latest: HashMap<String, String>,
}

/// Registry client serving canned data and counting every request.
#[derive(Debug, Default)]
pub struct FakeRegistry {
    data: Mutex<RegistryData>,
    calls: AtomicUsize,
}

impl FakeRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `versions` under `key`.
    pub fn set_versions(&self, key: &str, versions: &[&str]) {
        lock(&self.data).versions.insert(
            key.to_string(),
            versions.iter().map(|v| (*v).to_string()).collect(),
        );
    }

    /// Point `tag` at `version` under `key`.
    pub fn set_tag(&self, key: &str, tag: &str, version: &str) {
        lock(&self.data)
            .tags
            .entry(key.to_string())
            .or_default()
            .insert(tag.to_string(), version.to_string());
    }

    /// Latest stable release for `key`.
    pub fn set_latest(&self, key: &str, version: &str) {
        lock(&self.data)
            .latest
            .insert(key.to_string(), version.to_string());
    }

    /// Number of requests served so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn missing(registry: &RegistrySpec) -> Error {
        Error::registry(format!("No fixture registered for {}", registry_key(registry)))
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn fetch_available_versions(&self, registry: &RegistrySpec) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.data)
            .versions
            .get(registry_key(registry))
            .cloned()
            .ok_or_else(|| Self::missing(registry))
    }

    async fn fetch_available_tags(
        &self,
        registry: &RegistrySpec,
    ) -> Result<HashMap<String, String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.data)
            .tags
            .get(registry_key(registry))
            .cloned()
            .ok_or_else(|| Self::missing(registry))
    }

    async fn fetch_latest_stable_version(&self, source: &RegistrySpec) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.data)
            .latest
            .get(registry_key(source))
            .cloned()
            .ok_or_else(|| Self::missing(source))
    }
}

/// Install cache that records installs without touching the disk.
#[derive(Debug, Default)]
pub struct FakeInstaller {
    installed: Mutex<HashMap<String, Vec<String>>>,
    installs: Mutex<Vec<Locator>>,
}

impl FakeInstaller {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `name@version` is already installed.
    pub fn add_installed(&self, name: &str, version: &str) {
        lock(&self.installed)
            .entry(name.to_string())
            .or_default()
            .push(version.to_string());
    }

    /// Every locator passed to `install_version`, in order.
    #[must_use]
    pub fn installs(&self) -> Vec<Locator> {
        lock(&self.installs).clone()
    }
}

#[async_trait]
impl Installer for FakeInstaller {
    async fn find_installed_version(&self, descriptor: &Descriptor) -> Result<Option<String>> {
        let Some(requested) = VersionRange::parse(&descriptor.range) else {
            return Ok(None);
        };
        let mut matching: Vec<_> = lock(&self.installed)
            .get(&descriptor.name)
            .into_iter()
            .flatten()
            .filter_map(|version| range::parse_exact(version))
            .filter(|version| requested.satisfies(version))
            .collect();
        range::sort_descending(&mut matching);
        Ok(matching.first().map(ToString::to_string))
    }

    async fn install_version(&self, locator: &Locator, _spec: &RangeSpec) -> Result<InstallInfo> {
        lock(&self.installs).push(locator.clone());
        if !descriptor::is_url(&locator.reference) {
            self.add_installed(&locator.name, locator.version());
        }
        Ok(InstallInfo {
            location: PathBuf::from("/fake").join(&locator.name).join(locator.version()),
            hash: FIXTURE_HASH.to_string(),
            bin: None,
        })
    }
}

/// Last-Known-Good store kept in memory, counting writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<LastKnownGood>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `reference` for `name` without counting a write.
    pub fn seed(&self, name: &str, reference: &str) {
        lock(&self.snapshot).set(name, reference);
    }

    /// Make every subsequent save fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current contents.
    #[must_use]
    pub fn snapshot(&self) -> LastKnownGood {
        lock(&self.snapshot).clone()
    }
}

#[async_trait]
impl LastKnownGoodStore for MemoryStore {
    async fn load(&self) -> Result<LastKnownGood> {
        Ok(self.snapshot())
    }

    async fn save(&self, snapshot: &LastKnownGood) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::io(
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only store"),
                None,
                "write last known good",
            ));
        }
        *lock(&self.snapshot) = snapshot.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Project-spec loader returning a fixed outcome and recording pins.
#[derive(Debug)]
pub struct ScriptedProjects {
    outcome: Mutex<ProjectSpecOutcome>,
    loads: AtomicUsize,
    writes: Mutex<Vec<(PathBuf, Locator)>>,
    fail_writes: AtomicBool,
}

impl Default for ScriptedProjects {
    fn default() -> Self {
        Self {
            outcome: Mutex::new(ProjectSpecOutcome::NoProject),
            loads: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        }
    }
}

impl ScriptedProjects {
    /// Loader reporting no project.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome returned by every subsequent load.
    pub fn set(&self, outcome: ProjectSpecOutcome) {
        *lock(&self.outcome) = outcome;
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of loads performed.
    #[must_use]
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Boundary and locator of every successful write.
    #[must_use]
    pub fn writes(&self) -> Vec<(PathBuf, Locator)> {
        lock(&self.writes).clone()
    }
}

#[async_trait]
impl ProjectSpecs for ScriptedProjects {
    async fn load(&self, _cwd: &Path) -> Result<ProjectSpecOutcome> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.outcome).clone())
    }

    async fn write(&self, boundary: &Path, install: &InstallSpec) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::io(
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only project"),
                Some(boundary.join("package.json")),
                "write package.json",
            ));
        }
        lock(&self.writes).push((boundary.to_path_buf(), install.locator.clone()));
        Ok(())
    }
}

/// A run recorded by [`RecordingRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRun {
    /// Locator that was run.
    pub locator: Locator,
    /// Binary name.
    pub binary: String,
    /// Arguments.
    pub args: Vec<String>,
}

/// Runner that records invocations instead of spawning processes.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    runs: Mutex<Vec<RecordedRun>>,
    exit_code: AtomicI32,
}

impl RecordingRunner {
    /// Runner exiting with 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit code reported for subsequent runs.
    pub fn set_exit_code(&self, code: i32) {
        self.exit_code.store(code, Ordering::SeqCst);
    }

    /// Recorded runs, in order.
    #[must_use]
    pub fn runs(&self) -> Vec<RecordedRun> {
        lock(&self.runs).clone()
    }
}

#[async_trait]
impl Runner for RecordingRunner {
    async fn run(&self, install: &InstallSpec, binary: &str, args: &[String]) -> Result<i32> {
        lock(&self.runs).push(RecordedRun {
            locator: install.locator.clone(),
            binary: binary.to_string(),
            args: args.to_vec(),
        });
        Ok(self.exit_code.load(Ordering::SeqCst))
    }
}

/// The fixture table plus one of each fake, shared with the engines it builds.
#[derive(Debug, Clone)]
pub struct Harness {
    /// Definition table.
    pub definitions: Arc<Definitions>,
    /// Registry fake.
    pub registry: Arc<FakeRegistry>,
    /// Installer fake.
    pub installer: Arc<FakeInstaller>,
    /// Last-Known-Good fake.
    pub store: Arc<MemoryStore>,
    /// Project-spec fake.
    pub projects: Arc<ScriptedProjects>,
    /// Runner fake.
    pub runner: Arc<RecordingRunner>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// Harness over [`fixture_definitions`] with empty fakes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            definitions: Arc::new(fixture_definitions()),
            registry: Arc::new(FakeRegistry::new()),
            installer: Arc::new(FakeInstaller::new()),
            store: Arc::new(MemoryStore::new()),
            projects: Arc::new(ScriptedProjects::new()),
            runner: Arc::new(RecordingRunner::new()),
        }
    }

    /// Engine with the default configuration.
    #[must_use]
    pub fn engine(&self) -> Engine {
        self.engine_with(Config::default())
    }

    /// Engine with `config`.
    ///
    /// # Panics
    ///
    /// Never in practice: every collaborator is supplied.
    #[must_use]
    pub fn engine_with(&self, config: Config) -> Engine {
        Engine::builder(Arc::clone(&self.definitions), config)
            .registry(self.registry.clone())
            .installer(self.installer.clone())
            .projects(self.projects.clone())
            .store(self.store.clone())
            .runner(self.runner.clone())
            .build()
            .unwrap_or_else(|e| panic!("harness engine is incomplete: {e}"))
    }
}
