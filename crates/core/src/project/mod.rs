//! Project-spec discovery, reconciliation and auto-pinning.

mod package_json;

pub use package_json::{PackageJsonSpecs, parse_spec};

use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

use crate::descriptor::{Descriptor, InstallSpec, Locator};
use crate::engine::Engine;
use crate::provider::ProjectSpecOutcome;
use crate::{Error, Result};

impl Engine {
    /// Decide what to run in `cwd`, reconciling the project's pin with the
    /// requested tool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProjectPackageManagerMismatch`] when the project pins
    /// another tool and the invocation is not transparent.
    pub async fn find_project_spec(
        &self,
        cwd: &Path,
        fallback: &Locator,
        transparent: bool,
    ) -> Result<Descriptor> {
        self.find_project_spec_inner(cwd, &fallback.name, Some(fallback.to_descriptor()), transparent)
            .await
    }

    /// Same as [`Engine::find_project_spec`], for a request that may have no
    /// fallback. Without one, only a project pin naming `requested` can
    /// satisfy the request.
    #[instrument(skip(self, fallback), fields(cwd = %cwd.display()))]
    pub(crate) async fn find_project_spec_inner(
        &self,
        cwd: &Path,
        requested: &str,
        fallback: Option<Descriptor>,
        transparent: bool,
    ) -> Result<Descriptor> {
        let no_fallback = || Error::unsupported(requested);

        if !self.config.project_spec {
            return fallback.ok_or_else(no_fallback);
        }
        let transparent = transparent || !self.config.strict;

        match self.projects.load(cwd).await? {
            ProjectSpecOutcome::NoProject => {
                let fallback = fallback.ok_or_else(no_fallback)?;
                debug!(fallback = %fallback, "No project manifest found");
                Ok(fallback)
            }
            ProjectSpecOutcome::NoSpec { boundary } => {
                let fallback = fallback.ok_or_else(no_fallback)?;
                if self.config.auto_pin {
                    self.auto_pin(&boundary, &fallback).await?;
                }
                debug!(fallback = %fallback, boundary = %boundary.display(), "Project declares no package manager");
                Ok(fallback)
            }
            ProjectSpecOutcome::Found { descriptor, path } => {
                if descriptor.name == requested {
                    debug!(descriptor = %descriptor, path = %path.display(), "Using project package manager");
                    return Ok(descriptor);
                }
                match fallback {
                    Some(fallback) if transparent => {
                        debug!(
                            project = %descriptor,
                            fallback = %fallback,
                            "Ignoring project package manager for transparent command"
                        );
                        Ok(fallback)
                    }
                    _ => Err(Error::ProjectPackageManagerMismatch {
                        project: descriptor.name,
                        requested: requested.to_string(),
                        path: path.into_boxed_path(),
                    }),
                }
            }
        }
    }

    async fn auto_pin(&self, boundary: &Path, fallback: &Descriptor) -> Result<()> {
        let resolved = self
            .resolve_descriptor(fallback, true, true)
            .await?
            .ok_or_else(|| Error::resolution_failed(&fallback.name, &fallback.range))?;
        let install = self.ensure_package_manager(&resolved).await?;

        warn!(
            "The local project doesn't define a 'packageManager' field. corepin will now add one referencing {}",
            install.locator
        );
        if let Err(e) = self.projects.write(boundary, &install).await {
            warn!(error = %e, boundary = %boundary.display(), "Failed to write packageManager field");
        }
        Ok(())
    }

    /// Resolve `descriptor`, install it and pin it in the project containing
    /// `cwd` (or in `cwd` itself when there is no project yet).
    #[instrument(skip(self), fields(cwd = %cwd.display(), descriptor = %descriptor))]
    pub async fn pin_project(&self, cwd: &Path, descriptor: &Descriptor) -> Result<InstallSpec> {
        let resolved = self
            .resolve_descriptor(descriptor, true, false)
            .await?
            .ok_or_else(|| Error::resolution_failed(&descriptor.name, &descriptor.range))?;
        let install = self.ensure_package_manager(&resolved).await?;

        let boundary: PathBuf = match self.projects.load(cwd).await? {
            ProjectSpecOutcome::NoProject => cwd.to_path_buf(),
            ProjectSpecOutcome::NoSpec { boundary } => boundary,
            ProjectSpecOutcome::Found { path, .. } => path
                .parent()
                .map_or_else(|| cwd.to_path_buf(), Path::to_path_buf),
        };
        self.projects.write(&boundary, &install).await?;
        Ok(install)
    }
}
