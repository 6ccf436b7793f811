//! Error types for corepin-core

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for resolution, activation and dispatch.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The requested tool has no definition in the table.
    #[error("This package manager ({name}) isn't supported by this corepin build")]
    #[diagnostic(code(corepin::resolve::unsupported))]
    UnsupportedPackageManager {
        /// Requested tool name
        name: String,
    },

    /// A URL range was used for a name that collides with a known tool.
    #[error("Illegal use of URL for known package manager ({descriptor})")]
    #[diagnostic(
        code(corepin::resolve::illegal_custom_url),
        help(
            "Select a specific version instead, or set COREPIN_ENABLE_UNSAFE_CUSTOM_URLS=1 in your environment"
        )
    )]
    IllegalCustomUrl {
        /// The offending `name@url` pair
        descriptor: String,
    },

    /// A dist-tag was used where only versions and ranges are accepted.
    #[error("Package managers can't be referenced via tags in this context ({descriptor})")]
    #[diagnostic(code(corepin::resolve::tags_not_allowed))]
    TagsNotAllowed {
        /// The offending `name@tag` pair
        descriptor: String,
    },

    /// The dist-tag is missing from the registry's tag map.
    #[error("Tag not found ({tag}) for {name}")]
    #[diagnostic(code(corepin::resolve::tag_not_found))]
    TagNotFound {
        /// Tool name
        name: String,
        /// Requested tag
        tag: String,
    },

    /// No available version satisfies the requested range.
    #[error("Failed to successfully resolve '{range}' to a valid {name} release")]
    #[diagnostic(code(corepin::resolve::failed))]
    ResolutionFailed {
        /// Tool name
        name: String,
        /// Range that could not be satisfied
        range: String,
    },

    /// The project pins a different tool than the one requested.
    #[error(
        "This project is configured to use {project} because {} has a \"packageManager\" field",
        path.display()
    )]
    #[diagnostic(
        code(corepin::project::mismatch),
        help("Run the pinned package manager instead, or set COREPIN_ENABLE_STRICT=0 to ignore the pin")
    )]
    ProjectPackageManagerMismatch {
        /// Tool declared by the project
        project: String,
        /// Tool that was requested
        requested: String,
        /// Manifest declaring the pin
        path: Box<Path>,
    },

    /// Internal inconsistency between resolution and the definition table.
    #[error("Assertion failed: {message}")]
    #[diagnostic(code(corepin::internal::assertion))]
    AssertionFailure {
        /// Description of the broken invariant
        message: String,
    },

    /// Invalid definition table or configuration.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(corepin::config::invalid))]
    Configuration {
        /// The error message describing the configuration issue
        message: String,
    },

    /// Invalid project manifest or `packageManager` field.
    #[error("Invalid project spec in {}: {message}", path.display())]
    #[diagnostic(code(corepin::project::invalid))]
    InvalidProjectSpec {
        /// Manifest the pin was read from
        path: Box<Path>,
        /// What is wrong with it
        message: String,
    },

    /// Registry request or payload failure.
    #[error("Registry error: {message}")]
    #[diagnostic(code(corepin::registry))]
    Registry {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },

    /// Download, verification or extraction failure.
    #[error("Install failed for {name}@{reference}: {message}")]
    #[diagnostic(code(corepin::install))]
    Install {
        /// Tool name
        name: String,
        /// Reference being installed
        reference: String,
        /// The error message
        message: String,
    },

    /// Process spawn failure.
    #[error("Execution failed: {message}")]
    #[diagnostic(code(corepin::exec))]
    Execution {
        /// The error message
        message: String,
    },

    /// I/O error with path context
    #[error("I/O error during {operation}: {source}")]
    #[diagnostic(code(corepin::io))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// The path where the I/O error occurred, if applicable
        path: Option<Box<Path>>,
        /// Description of the operation that failed
        operation: String,
    },
}

impl Error {
    /// Create an unsupported package manager error
    pub fn unsupported(name: impl Into<String>) -> Self {
        Self::UnsupportedPackageManager { name: name.into() }
    }

    /// Create a resolution failure for `name@range`
    pub fn resolution_failed(name: impl Into<String>, range: impl Into<String>) -> Self {
        Self::ResolutionFailed {
            name: name.into(),
            range: range.into(),
        }
    }

    /// Create an assertion failure
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailure {
            message: message.into(),
        }
    }

    /// Create a configuration error with a message
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid project spec error
    pub fn invalid_project_spec(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidProjectSpec {
            path: path.into().into_boxed_path(),
            message: message.into(),
        }
    }

    /// Create a registry error
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
            help: None,
        }
    }

    /// Create a registry error with help text
    pub fn registry_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create an install error for `name@reference`
    pub fn install(
        name: impl Into<String>,
        reference: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Install {
            name: name.into(),
            reference: reference.into(),
            message: message.into(),
        }
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Create an I/O error with context
    pub fn io(source: std::io::Error, path: Option<PathBuf>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.map(|p| p.into_boxed_path()),
            operation: operation.into(),
        }
    }

    /// Whether this error is a user-actionable resolution problem.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        !matches!(self, Self::AssertionFailure { .. } | Self::Io { .. })
    }
}

/// Result type alias for corepin operations
pub type Result<T> = std::result::Result<T, Error>;
