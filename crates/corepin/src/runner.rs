//! Spawns the resolved package manager binary.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use corepin_core::{Error, InstallSpec, Result, Runner};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Extensions run through Node.js.
const NODE_EXTENSIONS: &[&str] = &["js", "cjs", "mjs"];

/// [`Runner`] spawning the binary as a child process with inherited stdio.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    node: OsString,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            node: OsString::from("node"),
        }
    }
}

impl ProcessRunner {
    /// Runner using `node` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific Node.js executable for script binaries.
    #[must_use]
    pub fn with_node(mut self, node: impl Into<OsString>) -> Self {
        self.node = node.into();
        self
    }

    /// Program and arguments for running `binary` from `install`.
    pub fn command_line(
        &self,
        install: &InstallSpec,
        binary: &str,
        args: &[String],
    ) -> Result<(OsString, Vec<OsString>)> {
        let bin_path = install.bin_path(binary).ok_or_else(|| {
            Error::execution(format!(
                "{} does not provide a '{}' binary",
                install.locator, binary
            ))
        })?;
        if !bin_path.is_file() {
            return Err(Error::execution(format!(
                "Binary '{}' is missing from {}",
                binary,
                install.info.location.display()
            )));
        }

        let rest = args.iter().map(OsString::from);
        if is_script(&bin_path) {
            let argv = std::iter::once(bin_path.into_os_string()).chain(rest).collect();
            Ok((self.node.clone(), argv))
        } else {
            Ok((bin_path.into_os_string(), rest.collect()))
        }
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    #[instrument(skip(self, install, args), fields(locator = %install.locator))]
    async fn run(&self, install: &InstallSpec, binary: &str, args: &[String]) -> Result<i32> {
        let (program, argv) = self.command_line(install, binary, args)?;
        debug!(?program, ?argv, "Spawning");

        let status = Command::new(&program)
            .args(&argv)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| {
                Error::execution(format!(
                    "Failed to spawn {}: {}",
                    PathBuf::from(&program).display(),
                    e
                ))
            })?;

        Ok(exit_code(status))
    }
}

fn is_script(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| NODE_EXTENSIONS.contains(&ext))
}

/// Child exit code; a signal-terminated child reports `128 + signal`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
