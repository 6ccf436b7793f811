//! Wiring the engine to its collaborators and executing invocations.

use std::path::Path;
use std::sync::Arc;

use corepin_core::descriptor::split_spec;
use corepin_core::{
    Config, Definitions, Descriptor, Engine, FileStore, PackageJsonSpecs, Request, Result,
};
use corepin_tools_npm::{NpmRegistryClient, TarballInstaller};
use tracing::{info, instrument};

use crate::cli::{CliError, EXIT_OK, Invocation};
use crate::runner::ProcessRunner;

/// Engine backed by the network, the install cache under the corepin home,
/// `package.json` manifests and real processes.
pub fn build_engine(definitions: Arc<Definitions>, config: Config) -> Result<Engine> {
    let registry = NpmRegistryClient::new(&config)?;
    let installer = TarballInstaller::new(&config)?;
    let projects = PackageJsonSpecs::new(Arc::clone(&definitions), config.unsafe_custom_urls);
    let store = FileStore::new(config.last_known_good_path());

    Engine::builder(definitions, config)
        .registry(Arc::new(registry))
        .installer(Arc::new(installer))
        .projects(Arc::new(projects))
        .store(Arc::new(store))
        .runner(Arc::new(ProcessRunner::new()))
        .build()
}

/// Execute `invocation` from `cwd`, returning the process exit code.
#[instrument(skip(engine), fields(cwd = %cwd.display()))]
pub async fn execute(engine: &Engine, invocation: Invocation, cwd: &Path) -> std::result::Result<i32, CliError> {
    match invocation {
        Invocation::Run { binary, args } => {
            let request = Request::parse(engine.definitions(), &binary);
            Ok(engine.execute_request(&request, cwd, &args).await?)
        }
        Invocation::Use { spec } => {
            let descriptor = descriptor_for(engine, &spec).await?;
            let install = engine.pin_project(cwd, &descriptor).await?;
            info!(locator = %install.locator, "Pinned project package manager");
            report(&format!("Pinned {} in the nearest package.json", install.locator));
            Ok(EXIT_OK)
        }
        Invocation::InstallGlobal { spec } => {
            let descriptor = descriptor_for(engine, &spec).await?;
            let install = engine.install_global(&descriptor).await?;
            report(&format!("Installed {} as the global default", install.locator));
            Ok(EXIT_OK)
        }
    }
}

/// `name[@range]` as a descriptor. A bare name stands for the tool's default
/// version.
async fn descriptor_for(engine: &Engine, spec: &str) -> std::result::Result<Descriptor, CliError> {
    let (name, range) = split_spec(spec);
    if name.is_empty() {
        return Err(CliError::config_with_help(
            format!("Invalid package manager specification '{}'", spec),
            "Use NAME or NAME@RANGE, for example pnpm@9",
        ));
    }
    let range = match range {
        Some(range) => range.to_string(),
        None => engine.default_version(name).await?,
    };
    Ok(Descriptor::new(name, range))
}

#[allow(clippy::print_stdout)]
fn report(message: &str) {
    println!("{message}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use corepin_core::ProjectSpecOutcome;
    use corepin_core::test_utils::{FIXTURE_HASH, Harness};
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_run_with_explicit_version() {
        let harness = Harness::new();
        harness.runner.set_exit_code(5);
        let engine = harness.engine();

        let code = execute(
            &engine,
            Invocation::Run {
                binary: "pnpm@9.1.0".into(),
                args: vec!["install".into()],
            },
            Path::new("/work"),
        )
        .await
        .unwrap();

        assert_eq!(code, 5);
        let runs = harness.runner.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].binary, "pnpm");
        assert_eq!(runs[0].locator.reference, format!("9.1.0+{}", FIXTURE_HASH));
        assert_eq!(runs[0].args, ["install"]);
    }

    #[tokio::test]
    async fn test_use_pins_project() {
        let harness = Harness::new();
        harness.registry.set_versions("pnpm", &["9.0.0", "9.1.0", "8.15.0"]);
        harness.projects.set(ProjectSpecOutcome::NoSpec {
            boundary: PathBuf::from("/repo"),
        });
        let engine = harness.engine();

        let code = execute(
            &engine,
            Invocation::Use {
                spec: "pnpm@^9.0.0".into(),
            },
            Path::new("/repo/packages/app"),
        )
        .await
        .unwrap();

        assert_eq!(code, EXIT_OK);
        let writes = harness.projects.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, PathBuf::from("/repo"));
        assert_eq!(writes[0].1.version(), "9.1.0");
    }

    #[tokio::test]
    async fn test_install_global_bare_name_uses_default() {
        let harness = Harness::new();
        let engine = harness.engine_with(Config::default().with_default_to_latest(false));

        execute(
            &engine,
            Invocation::InstallGlobal {
                spec: "pnpm".into(),
            },
            Path::new("/work"),
        )
        .await
        .unwrap();

        assert_eq!(
            harness.store.snapshot().get("pnpm"),
            Some(format!("9.1.0+{}", FIXTURE_HASH).as_str())
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_resolution_error() {
        let harness = Harness::new();
        let engine = harness.engine();

        let err = execute(
            &engine,
            Invocation::Use {
                spec: "bun@1.0.0".into(),
            },
            Path::new("/work"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CliError::Resolution { .. }));
    }

    #[test]
    fn test_build_engine_with_builtin_definitions() {
        let home = tempfile::tempdir().unwrap();
        let definitions = Arc::new(Definitions::builtin().unwrap());
        let engine =
            build_engine(definitions, Config::default().with_home(home.path())).unwrap();
        assert!(engine.definitions().is_supported("pnpm"));
    }
}
