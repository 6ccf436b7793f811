//! Core of corepin, a dispatcher that runs the right version of a project's
//! package manager.
//!
//! Given "run binary X with args Y in directory Z", the [`Engine`] works out
//! which exact, content-verified version of the tool should run:
//!
//! 1. a default version comes from the Last-Known-Good store, the static
//!    definition table or the registry's latest release
//! 2. the project's `packageManager` pin is reconciled with the request
//! 3. the resulting descriptor is resolved to a locator (cache, exact-version
//!    shortcut, dist-tags, or a fan-out over every declared range)
//! 4. the locator is installed, its hash verified, and the binary handed to
//!    a [`provider::Runner`]
//!
//! Network access, the install cache, project manifests and process spawning
//! are collaborators behind the traits in [`provider`].

pub mod config;
pub mod definitions;
pub mod descriptor;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod project;
pub mod provider;
pub mod range;
pub mod store;

mod activator;
mod resolver;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::Config;
pub use definitions::{BinSpec, Definition, Definitions, RangeSpec, RegistrySpec};
pub use descriptor::{Descriptor, InstallInfo, InstallSpec, Locator};
pub use dispatcher::Request;
pub use engine::{Engine, EngineBuilder};
pub use error::{Error, Result};
pub use project::PackageJsonSpecs;
pub use provider::{
    Installer, LastKnownGoodStore, ProjectSpecOutcome, ProjectSpecs, RegistryClient, Runner,
};
pub use store::{FileStore, LastKnownGood};
