//! Runtime switches for corepin.
//!
//! All flags are collected once into a [`Config`] value and threaded through
//! the engine; nothing below the CLI reads the environment directly.

use std::path::PathBuf;

/// `0` disables project-spec lookup.
pub const ENV_ENABLE_PROJECT_SPEC: &str = "COREPIN_ENABLE_PROJECT_SPEC";
/// `0` relaxes project-pin mismatch enforcement for every invocation.
pub const ENV_ENABLE_STRICT: &str = "COREPIN_ENABLE_STRICT";
/// `0` disables writing a pin into projects that lack one.
pub const ENV_ENABLE_AUTO_PIN: &str = "COREPIN_ENABLE_AUTO_PIN";
/// `0` uses the definition's static default instead of the latest release.
pub const ENV_DEFAULT_TO_LATEST: &str = "COREPIN_DEFAULT_TO_LATEST";
/// `1` allows URL ranges for names of supported tools.
pub const ENV_ENABLE_UNSAFE_CUSTOM_URLS: &str = "COREPIN_ENABLE_UNSAFE_CUSTOM_URLS";
/// Root directory for the install cache and the Last-Known-Good file.
pub const ENV_HOME: &str = "COREPIN_HOME";
/// Base URL replacing the public npm registry.
pub const ENV_NPM_REGISTRY: &str = "COREPIN_NPM_REGISTRY";

/// Name of the Last-Known-Good file inside the home directory.
pub const LAST_KNOWN_GOOD_NAME: &str = "lastKnownGood.json";

/// Install cache layout version.
const INSTALL_LAYOUT: &str = "v1";

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Look for a project pin before falling back to defaults.
    pub project_spec: bool,
    /// Fail when the project pins a different tool. `false` behaves as if
    /// every invocation were transparent.
    pub strict: bool,
    /// Write a pin into projects that declare none.
    pub auto_pin: bool,
    /// Fetch the latest stable release when no Last-Known-Good entry exists.
    pub default_to_latest: bool,
    /// Allow URL ranges for names of supported tools.
    pub unsafe_custom_urls: bool,
    /// Root directory for the install cache and Last-Known-Good file.
    pub home: PathBuf,
    /// npm registry override.
    pub npm_registry: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_spec: true,
            strict: true,
            auto_pin: true,
            default_to_latest: true,
            unsafe_custom_urls: false,
            home: default_home(),
            npm_registry: None,
        }
    }
}

impl Config {
    /// Read the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let disabled = |key: &str| lookup(key).as_deref() == Some("0");
        let enabled = |key: &str| lookup(key).as_deref() == Some("1");

        Self {
            project_spec: !disabled(ENV_ENABLE_PROJECT_SPEC),
            strict: !disabled(ENV_ENABLE_STRICT),
            auto_pin: !disabled(ENV_ENABLE_AUTO_PIN),
            default_to_latest: !disabled(ENV_DEFAULT_TO_LATEST),
            unsafe_custom_urls: enabled(ENV_ENABLE_UNSAFE_CUSTOM_URLS),
            home: lookup(ENV_HOME)
                .filter(|home| !home.is_empty())
                .map_or_else(default_home, PathBuf::from),
            npm_registry: lookup(ENV_NPM_REGISTRY)
                .filter(|url| !url.is_empty())
                .map(|url| url.trim_end_matches('/').to_string()),
        }
    }

    /// Set the home directory.
    #[must_use]
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self
    }

    /// Enable or disable project-spec lookup.
    #[must_use]
    pub fn with_project_spec(mut self, enabled: bool) -> Self {
        self.project_spec = enabled;
        self
    }

    /// Enable or disable strict mismatch enforcement.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Enable or disable auto-pinning.
    #[must_use]
    pub fn with_auto_pin(mut self, enabled: bool) -> Self {
        self.auto_pin = enabled;
        self
    }

    /// Enable or disable fetching the latest release as default.
    #[must_use]
    pub fn with_default_to_latest(mut self, enabled: bool) -> Self {
        self.default_to_latest = enabled;
        self
    }

    /// Allow or forbid URL ranges for supported tools.
    #[must_use]
    pub fn with_unsafe_custom_urls(mut self, enabled: bool) -> Self {
        self.unsafe_custom_urls = enabled;
        self
    }

    /// Directory holding installed versions.
    #[must_use]
    pub fn install_dir(&self) -> PathBuf {
        self.home.join(INSTALL_LAYOUT)
    }

    /// Path of the Last-Known-Good file.
    #[must_use]
    pub fn last_known_good_path(&self) -> PathBuf {
        self.home.join(LAST_KNOWN_GOOD_NAME)
    }
}

/// Default home directory, `~/.cache/corepin`.
#[must_use]
pub fn default_home() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("corepin")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[]));
        assert!(config.project_spec);
        assert!(config.strict);
        assert!(config.auto_pin);
        assert!(config.default_to_latest);
        assert!(!config.unsafe_custom_urls);
        assert!(config.home.ends_with("corepin"));
        assert!(config.npm_registry.is_none());
    }

    #[test]
    fn test_disable_flags() {
        let config = Config::from_lookup(lookup(&[
            (ENV_ENABLE_PROJECT_SPEC, "0"),
            (ENV_ENABLE_STRICT, "0"),
            (ENV_ENABLE_AUTO_PIN, "0"),
            (ENV_DEFAULT_TO_LATEST, "0"),
            (ENV_ENABLE_UNSAFE_CUSTOM_URLS, "1"),
        ]));
        assert!(!config.project_spec);
        assert!(!config.strict);
        assert!(!config.auto_pin);
        assert!(!config.default_to_latest);
        assert!(config.unsafe_custom_urls);
    }

    #[test]
    fn test_only_exact_values_toggle() {
        let config = Config::from_lookup(lookup(&[
            (ENV_ENABLE_AUTO_PIN, "false"),
            (ENV_ENABLE_UNSAFE_CUSTOM_URLS, "true"),
        ]));
        assert!(config.auto_pin);
        assert!(!config.unsafe_custom_urls);
    }

    #[test]
    fn test_home_and_registry() {
        let config = Config::from_lookup(lookup(&[
            (ENV_HOME, "/opt/corepin"),
            (ENV_NPM_REGISTRY, "https://npm.internal/"),
        ]));
        assert_eq!(config.home, PathBuf::from("/opt/corepin"));
        assert_eq!(config.install_dir(), PathBuf::from("/opt/corepin/v1"));
        assert_eq!(
            config.last_known_good_path(),
            PathBuf::from("/opt/corepin/lastKnownGood.json")
        );
        assert_eq!(config.npm_registry.as_deref(), Some("https://npm.internal"));
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                (ENV_ENABLE_STRICT, Some("0")),
                (ENV_HOME, Some("/tmp/corepin-env-test")),
            ],
            || {
                let config = Config::from_env();
                assert!(!config.strict);
                assert_eq!(config.home, PathBuf::from("/tmp/corepin-env-test"));
            },
        );
    }

    #[test]
    fn test_builder() {
        let config = Config::default()
            .with_home("/x")
            .with_project_spec(false)
            .with_strict(false)
            .with_auto_pin(false)
            .with_default_to_latest(false)
            .with_unsafe_custom_urls(true);
        assert_eq!(config.home, PathBuf::from("/x"));
        assert!(!config.project_spec);
        assert!(!config.strict);
        assert!(!config.auto_pin);
        assert!(!config.default_to_latest);
        assert!(config.unsafe_custom_urls);
    }
}
