//! npm registry client and tarball installer for corepin.
//!
//! [`NpmRegistryClient`] lists versions and tags from npm registries and
//! URL-hosted version documents. [`TarballInstaller`] downloads a locator,
//! verifies its hash and unpacks it into the install cache.

mod extract;
mod http;
mod installer;
mod registry;

pub use installer::TarballInstaller;
pub use registry::{DEFAULT_NPM_REGISTRY, NpmRegistryClient};
