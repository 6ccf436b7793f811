//! corepin command-line front end.
//!
//! Parses arguments (or detects shim mode), wires a [`corepin_core::Engine`]
//! to the npm registry client, the tarball installer, `package.json`
//! manifests and a process runner, then executes the invocation.

pub mod cli;
pub mod commands;
pub mod runner;

pub use cli::{CliError, Invocation};
pub use runner::ProcessRunner;
