//! Request dispatch: from "run binary X with args Y in Z" to a running tool.

use std::path::Path;
use tracing::{debug, info, instrument};

use crate::definitions::Definitions;
use crate::descriptor::{self, Descriptor, InstallSpec};
use crate::engine::Engine;
use crate::{Error, Result};

/// A request to run a binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Tool providing the binary, `None` when it is not a known binary.
    pub tool: Option<String>,
    /// Binary to run.
    pub binary_name: String,
    /// Version forced for this invocation, overriding pins and defaults.
    pub binary_version: Option<String>,
}

impl Request {
    /// Request for `binary_name` with no known tool and no override.
    #[must_use]
    pub fn new(binary_name: impl Into<String>) -> Self {
        Self {
            tool: None,
            binary_name: binary_name.into(),
            binary_version: None,
        }
    }

    /// Set the tool providing the binary.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Force a version for this invocation.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.binary_version = Some(version.into());
        self
    }

    /// Request for an invocation written as `binary` or `binary@version`.
    #[must_use]
    pub fn parse(definitions: &Definitions, invocation: &str) -> Self {
        let (binary, version) = descriptor::split_spec(invocation);
        Self {
            tool: definitions.tool_for_binary(binary).map(str::to_string),
            binary_name: binary.to_string(),
            binary_version: version.map(str::to_string),
        }
    }
}

impl Engine {
    /// Resolve and install whatever `request` should run in `cwd`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResolutionFailed`] when no release satisfies the final
    /// range, and propagates every resolution, project and install error.
    #[instrument(skip(self, args), fields(binary = %request.binary_name))]
    pub async fn prepare_request(
        &self,
        request: &Request,
        cwd: &Path,
        args: &[String],
    ) -> Result<InstallSpec> {
        let mut transparent = false;

        let fallback = match &request.tool {
            Some(tool) => {
                let definition = self
                    .definitions
                    .get(tool)
                    .ok_or_else(|| Error::unsupported(tool))?;
                let default = match &request.binary_version {
                    Some(version) => version.clone(),
                    None => self.default_version(tool).await?,
                };
                transparent = definition.transparent.matches(&request.binary_name, args);
                let reference = if transparent {
                    definition.transparent.default.clone().unwrap_or(default)
                } else {
                    default
                };
                Some(Descriptor::new(tool.clone(), reference))
            }
            None => request
                .binary_version
                .as_ref()
                .map(|version| Descriptor::new(request.binary_name.clone(), version.clone())),
        };
        debug!(fallback = ?fallback, transparent, "Computed fallback");

        let requested = request.tool.as_deref().unwrap_or(&request.binary_name);
        let mut descriptor = self
            .find_project_spec_inner(cwd, requested, fallback, transparent)
            .await?;

        if let Some(version) = &request.binary_version {
            descriptor.range = version.clone();
        }

        let locator = self
            .resolve_descriptor(&descriptor, true, true)
            .await?
            .ok_or_else(|| Error::resolution_failed(&descriptor.name, &descriptor.range))?;

        self.ensure_package_manager(&locator).await
    }

    /// Resolve, install and run `request`, returning the tool's exit code.
    pub async fn execute_request(
        &self,
        request: &Request,
        cwd: &Path,
        args: &[String],
    ) -> Result<i32> {
        let install = self.prepare_request(request, cwd, args).await?;
        info!(
            locator = %install.locator,
            binary = %request.binary_name,
            "Running package manager"
        );
        self.runner.run(&install, &request.binary_name, args).await
    }
}
