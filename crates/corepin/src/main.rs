//! corepin binary entry point.

use std::sync::Arc;

use corepin::cli::{self, CliError, EXIT_CLI, LogLevel, exit_code_for, render_error};
use corepin::commands;
use corepin_core::{Config, Definitions};
use tracing_subscriber::EnvFilter;

fn main() {
    // NOTE: tracing may not be usable during a panic, so write directly.
    #[allow(clippy::print_stderr)]
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("corepin panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let definitions = match Definitions::builtin() {
        Ok(definitions) => Arc::new(definitions),
        Err(e) => {
            render_error(&CliError::from(e));
            std::process::exit(EXIT_CLI);
        }
    };

    let (invocation, level) = match cli::parse_args(&definitions, std::env::args().collect()) {
        Ok(parsed) => parsed,
        Err(e) => e.exit(),
    };

    init_tracing(level);

    let exit_code = run_with_tokio(definitions, invocation);
    std::process::exit(exit_code);
}

/// Stderr subscriber; `RUST_LOG` takes precedence over `--level`.
fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Create tokio runtime and run async path
fn run_with_tokio(definitions: Arc<Definitions>, invocation: cli::Invocation) -> i32 {
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            render_error(&CliError::other(format!(
                "Failed to create tokio runtime: {e}"
            )));
            return cli::EXIT_OTHER;
        }
    };

    rt.block_on(async move {
        match run(definitions, invocation).await {
            Ok(code) => code,
            Err(err) => {
                render_error(&err);
                exit_code_for(&err)
            }
        }
    })
}

async fn run(definitions: Arc<Definitions>, invocation: cli::Invocation) -> Result<i32, CliError> {
    let engine = commands::build_engine(definitions, Config::from_env())?;
    let cwd = std::env::current_dir()
        .map_err(|e| CliError::other(format!("Cannot read the current directory: {e}")))?;
    commands::execute(&engine, invocation, &cwd).await
}
