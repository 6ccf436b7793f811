//! The resolution engine.
//!
//! [`Engine`] holds the definition table, the configuration and the
//! collaborators. Its operations are split by concern across the
//! `resolver`, `project`, `activator` and `dispatcher` modules.

use std::sync::Arc;

use crate::config::Config;
use crate::definitions::Definitions;
use crate::provider::{Installer, LastKnownGoodStore, ProjectSpecs, RegistryClient, Runner};
use crate::{Error, Result};

/// Resolves, installs and dispatches tool invocations.
pub struct Engine {
    pub(crate) definitions: Arc<Definitions>,
    pub(crate) config: Config,
    pub(crate) registry: Arc<dyn RegistryClient>,
    pub(crate) installer: Arc<dyn Installer>,
    pub(crate) projects: Arc<dyn ProjectSpecs>,
    pub(crate) store: Arc<dyn LastKnownGoodStore>,
    pub(crate) runner: Arc<dyn Runner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("tools", &self.definitions.names().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Start building an engine.
    #[must_use]
    pub fn builder(definitions: Arc<Definitions>, config: Config) -> EngineBuilder {
        EngineBuilder {
            definitions,
            config,
            registry: None,
            installer: None,
            projects: None,
            store: None,
            runner: None,
        }
    }

    /// The definition table.
    #[must_use]
    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Builder for [`Engine`]. Every collaborator is required.
pub struct EngineBuilder {
    definitions: Arc<Definitions>,
    config: Config,
    registry: Option<Arc<dyn RegistryClient>>,
    installer: Option<Arc<dyn Installer>>,
    projects: Option<Arc<dyn ProjectSpecs>>,
    store: Option<Arc<dyn LastKnownGoodStore>>,
    runner: Option<Arc<dyn Runner>>,
}

impl EngineBuilder {
    /// Set the registry client.
    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn RegistryClient>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the installer.
    #[must_use]
    pub fn installer(mut self, installer: Arc<dyn Installer>) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Set the project-spec loader.
    #[must_use]
    pub fn projects(mut self, projects: Arc<dyn ProjectSpecs>) -> Self {
        self.projects = Some(projects);
        self
    }

    /// Set the Last-Known-Good store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn LastKnownGoodStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the process runner.
    #[must_use]
    pub fn runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first missing collaborator.
    pub fn build(self) -> Result<Engine> {
        fn required<T: ?Sized>(value: Option<Arc<T>>, what: &str) -> Result<Arc<T>> {
            value.ok_or_else(|| Error::configuration(format!("Engine is missing a {}", what)))
        }

        Ok(Engine {
            registry: required(self.registry, "registry client")?,
            installer: required(self.installer, "installer")?,
            projects: required(self.projects, "project spec loader")?,
            store: required(self.store, "last known good store")?,
            runner: required(self.runner, "runner")?,
            definitions: self.definitions,
            config: self.config,
        })
    }
}
