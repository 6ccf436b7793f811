//! Command-line parsing, shim detection and error rendering.

use std::path::Path;

use clap::{Parser, Subcommand, ValueEnum};
use corepin_core::Definitions;
use miette::{Diagnostic, Report};
use std::io::{self, Write};
use thiserror::Error;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// Resolution, install or execution failure exit code
pub const EXIT_RESOLUTION: i32 = 1;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Unexpected internal error exit code
pub const EXIT_OTHER: i32 = 3;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// CLI or configuration error (exit code 2)
    #[error("{message}")]
    #[diagnostic(code(corepin::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// The package manager could not be resolved, installed or run (exit code 1)
    #[error("{message}")]
    #[diagnostic(code(corepin::cli::resolution))]
    Resolution {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Other unexpected error (exit code 3)
    #[error("Unexpected error: {message}")]
    #[diagnostic(code(corepin::cli::other))]
    Other {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: None,
        }
    }
}

/// Convert `corepin_core::Error` to the matching `CliError` variant.
///
/// Bad definitions, flags and manifests are configuration errors; anything
/// that stops a package manager from being resolved, installed or run is a
/// resolution error; broken invariants and I/O failures are unexpected.
impl From<corepin_core::Error> for CliError {
    fn from(err: corepin_core::Error) -> Self {
        use corepin_core::Error;

        let help = err.help().map(|h| h.to_string());
        match err {
            // Extract just the message to avoid "Configuration error: Configuration error:"
            Error::Configuration { message } => Self::Config { message, help },
            Error::InvalidProjectSpec { .. } => Self::Config {
                message: err.to_string(),
                help,
            },
            Error::Io {
                ref source,
                ref path,
                ref operation,
            } => {
                let path_str = path
                    .as_ref()
                    .map_or(String::new(), |p| format!(" on {}", p.display()));
                Self::Other {
                    message: format!("I/O {operation} failed{path_str}: {source}"),
                    help: Some("Check file permissions and ensure the path exists".to_string()),
                }
            }
            _ if !err.is_user_facing() => Self::Other {
                message: err.to_string(),
                help,
            },
            _ => Self::Resolution {
                message: err.to_string(),
                help,
            },
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Resolution { .. } => EXIT_RESOLUTION,
        CliError::Other { .. } => EXIT_OTHER,
    }
}

/// Render an error through miette on stderr.
#[allow(clippy::print_stderr)]
pub fn render_error(err: &CliError) {
    let report = Report::new(err.clone());
    eprintln!("{report:?}");
    // Ensure output is flushed before potential process exit
    let _ = io::stderr().flush();
}

/// Logging verbosity.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    /// Everything
    Trace,
    /// Resolution details
    Debug,
    /// Installs and pins
    Info,
    /// Warnings only
    #[default]
    Warn,
    /// Errors only
    Error,
}

impl LogLevel {
    /// `EnvFilter` directive for this level.
    #[must_use]
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Runs the package manager version your project asks for.
#[derive(Parser, Debug)]
#[command(name = "corepin")]
#[command(about = "Runs the package manager version your project asks for")]
#[command(long_about = None)]
#[command(version)]
#[command(subcommand_required = true, arg_required_else_help = true)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Set logging level (RUST_LOG takes precedence)",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pin a package manager in the current project.
    #[command(about = "Pin a package manager in the nearest package.json")]
    Use {
        /// Tool and optional range or tag, e.g. `pnpm@9` or `yarn@stable`.
        #[arg(value_name = "NAME[@RANGE]")]
        spec: String,
    },

    /// Install a package manager as the default outside pinned projects.
    #[command(about = "Install a package manager and make it the global default")]
    Install {
        /// Record the install as the global default.
        #[arg(short, long)]
        global: bool,

        /// Tool and optional range or tag.
        #[arg(value_name = "NAME[@RANGE]")]
        spec: String,
    },

    /// Any other subcommand is a binary to run, e.g. `pnpm install`.
    #[command(external_subcommand)]
    Run(Vec<String>),
}

/// What the process was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Run `binary` (optionally `binary@version`) with `args`.
    Run {
        /// Binary, possibly with an explicit version.
        binary: String,
        /// Arguments passed through untouched.
        args: Vec<String>,
    },
    /// Pin `spec` in the current project.
    Use {
        /// `name[@range]`
        spec: String,
    },
    /// Install `spec` and record it as Last-Known-Good.
    InstallGlobal {
        /// `name[@range]`
        spec: String,
    },
}

/// Parse process arguments.
///
/// When the executable is invoked under the name of a known binary (a shim
/// such as `pnpm -> corepin`), every argument is passed through and no
/// corepin flags are recognised.
pub fn parse_args(
    definitions: &Definitions,
    args: Vec<String>,
) -> Result<(Invocation, LogLevel), clap::Error> {
    if let Some(binary) = shim_binary(definitions, args.first().map(String::as_str)) {
        return Ok((
            Invocation::Run {
                binary,
                args: args.into_iter().skip(1).collect(),
            },
            LogLevel::default(),
        ));
    }

    let cli = Cli::try_parse_from(args)?;
    let invocation = match cli.command {
        Commands::Use { spec } => Invocation::Use { spec },
        Commands::Install { global: true, spec } => Invocation::InstallGlobal { spec },
        Commands::Install { global: false, .. } => {
            return Err(clap::Error::raw(
                clap::error::ErrorKind::MissingRequiredArgument,
                "only global installs are supported; pass --global\n",
            ));
        }
        Commands::Run(external) => {
            let mut external = external.into_iter();
            Invocation::Run {
                binary: external.next().unwrap_or_default(),
                args: external.collect(),
            }
        }
    };
    Ok((invocation, cli.level))
}

/// Binary name when `argv0` names a binary some tool provides.
fn shim_binary(definitions: &Definitions, argv0: Option<&str>) -> Option<String> {
    let stem = Path::new(argv0?).file_stem()?.to_str()?;
    definitions
        .tool_for_binary(stem)
        .is_some()
        .then(|| stem.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use corepin_core::test_utils::fixture_definitions;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_external_subcommand_runs_binary() {
        let (invocation, level) = parse_args(
            &fixture_definitions(),
            args(&["corepin", "pnpm@9.1.0", "install", "--frozen-lockfile"]),
        )
        .unwrap();

        assert_eq!(
            invocation,
            Invocation::Run {
                binary: "pnpm@9.1.0".into(),
                args: args(&["install", "--frozen-lockfile"]),
            }
        );
        assert_eq!(level, LogLevel::Warn);
    }

    #[test]
    fn test_level_before_binary() {
        let (_, level) = parse_args(
            &fixture_definitions(),
            args(&["corepin", "--level", "debug", "yarn", "--version"]),
        )
        .unwrap();
        assert_eq!(level, LogLevel::Debug);
    }

    #[test]
    fn test_shim_passes_everything_through() {
        let (invocation, _) = parse_args(
            &fixture_definitions(),
            args(&["/usr/local/bin/yarn", "--level", "debug"]),
        )
        .unwrap();

        assert_eq!(
            invocation,
            Invocation::Run {
                binary: "yarn".into(),
                args: args(&["--level", "debug"]),
            }
        );
    }

    #[test]
    fn test_use_and_install() {
        let definitions = fixture_definitions();
        let (invocation, _) =
            parse_args(&definitions, args(&["corepin", "use", "pnpm@9"])).unwrap();
        assert_eq!(invocation, Invocation::Use { spec: "pnpm@9".into() });

        let (invocation, _) =
            parse_args(&definitions, args(&["corepin", "install", "-g", "yarn"])).unwrap();
        assert_eq!(invocation, Invocation::InstallGlobal { spec: "yarn".into() });

        assert!(parse_args(&definitions, args(&["corepin", "install", "yarn"])).is_err());
    }

    #[test]
    fn test_core_error_mapping() {
        use corepin_core::Error;

        let err = CliError::from(Error::unsupported("bun"));
        assert_eq!(exit_code_for(&err), EXIT_RESOLUTION);

        let err = CliError::from(Error::configuration("bad table"));
        assert_eq!(err.to_string(), "bad table");
        assert_eq!(exit_code_for(&err), EXIT_CLI);

        let err = CliError::from(Error::assertion("no range"));
        assert_eq!(exit_code_for(&err), EXIT_OTHER);

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = CliError::from(Error::io(io, Some("/p/package.json".into()), "write"));
        assert!(err.to_string().contains("/p/package.json"));
        assert_eq!(exit_code_for(&err), EXIT_OTHER);
    }
}
