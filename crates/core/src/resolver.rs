//! Descriptor resolution, range-spec lookup and default version selection.

use futures::future::try_join_all;
use tracing::{debug, instrument};

use crate::definitions::RangeSpec;
use crate::descriptor::{Descriptor, Locator};
use crate::engine::Engine;
use crate::range::{self, VersionRange};
use crate::{Error, Result};

impl Engine {
    /// Resolve `descriptor` to a concrete locator.
    ///
    /// Returns `Ok(None)` only when no published version satisfies the range.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalCustomUrl`] for a URL range on a supported tool name
    ///   without the unsafe override
    /// - [`Error::UnsupportedPackageManager`] for an unknown tool name
    /// - [`Error::TagsNotAllowed`] / [`Error::TagNotFound`] for dist-tags
    /// - any collaborator failure, unmodified
    #[instrument(skip(self), fields(descriptor = %descriptor))]
    pub async fn resolve_descriptor(
        &self,
        descriptor: &Descriptor,
        allow_tags: bool,
        use_cache: bool,
    ) -> Result<Option<Locator>> {
        if descriptor.is_url() {
            if self.definitions.is_supported(&descriptor.name) && !self.config.unsafe_custom_urls {
                return Err(Error::IllegalCustomUrl {
                    descriptor: descriptor.to_string(),
                });
            }
            debug!("Custom tool resolves to its own URL");
            return Ok(Some(Locator::new(
                descriptor.name.clone(),
                descriptor.range.clone(),
            )));
        }

        let definition = self
            .definitions
            .get(&descriptor.name)
            .ok_or_else(|| Error::unsupported(&descriptor.name))?;

        let mut working = descriptor.range.trim().to_string();

        if !range::is_range(&working) {
            if !allow_tags {
                return Err(Error::TagsNotAllowed {
                    descriptor: descriptor.to_string(),
                });
            }
            let (_, spec) = definition
                .last_range()
                .ok_or_else(|| Error::assertion(format!("{} declares no ranges", descriptor.name)))?;
            let tags = self.registry.fetch_available_tags(&spec.registry).await?;
            let version = tags.get(&working).ok_or_else(|| Error::TagNotFound {
                name: descriptor.name.clone(),
                tag: working.clone(),
            })?;
            if !range::is_exact(version) {
                return Err(Error::registry(format!(
                    "Tag {} of {} points to '{}', which is not a version",
                    working, descriptor.name, version
                )));
            }
            debug!(tag = %working, version = %version, "Resolved dist-tag");
            working = version.clone();
        }

        if use_cache {
            let cached = self
                .installer
                .find_installed_version(&Descriptor::new(descriptor.name.clone(), working.clone()))
                .await?;
            if let Some(version) = cached {
                debug!(version = %version, "Using installed version");
                return Ok(Some(Locator::new(descriptor.name.clone(), version)));
            }
        }

        if range::is_exact(&working) {
            return Ok(Some(Locator::new(descriptor.name.clone(), working)));
        }

        let requested = VersionRange::parse(&working)
            .ok_or_else(|| Error::assertion(format!("'{}' is not a version range", working)))?;

        let listings = try_join_all(
            definition
                .ranges
                .values()
                .map(|spec| self.registry.fetch_available_versions(&spec.registry)),
        )
        .await?;

        let mut candidates: Vec<_> = listings
            .iter()
            .flatten()
            .filter_map(|version| range::parse_exact(version))
            .filter(|version| requested.satisfies(version))
            .collect();
        range::sort_descending(&mut candidates);

        let best = candidates.first().map(|version| {
            debug!(version = %version, candidates = candidates.len(), "Selected highest match");
            Locator::new(descriptor.name.clone(), version.to_string())
        });
        Ok(best)
    }

    /// Range spec governing an already resolved locator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssertionFailure`] when the reference matches none of
    /// the tool's declared ranges.
    pub fn spec_for(&self, locator: &Locator) -> Result<RangeSpec> {
        if crate::descriptor::is_url(&locator.reference) {
            return Ok(RangeSpec::for_custom_url(locator.reference.clone()));
        }

        let definition = self
            .definitions
            .get(&locator.name)
            .ok_or_else(|| Error::unsupported(&locator.name))?;

        definition
            .ranges
            .iter()
            .rev()
            .find(|(key, _)| {
                VersionRange::parse(key).is_some_and(|range| range.satisfies_str(locator.version()))
            })
            .map(|(_, spec)| spec.clone())
            .ok_or_else(|| {
                Error::assertion(format!(
                    "Expected {} to match one of the declared ranges of {}",
                    locator.reference, locator.name
                ))
            })
    }

    /// Version used when nothing more specific was requested.
    ///
    /// The Last-Known-Good entry always wins. Otherwise the static default is
    /// used when fetching the latest release is disabled; the fetched latest
    /// release is recorded as Last-Known-Good on a best-effort basis.
    #[instrument(skip(self))]
    pub async fn default_version(&self, name: &str) -> Result<String> {
        let definition = self
            .definitions
            .get(name)
            .ok_or_else(|| Error::unsupported(name))?;

        let snapshot = self.store.load().await?;
        if let Some(reference) = snapshot.get(name) {
            debug!(reference = %reference, "Using last known good version");
            return Ok(reference.to_string());
        }

        if !self.config.default_to_latest {
            return Ok(definition.default.clone());
        }

        let latest = self
            .registry
            .fetch_latest_stable_version(&definition.fetch_latest_from)
            .await?;

        if let Err(e) = self.activate(&Locator::new(name, latest.clone())).await {
            debug!(error = %e, "Failed to record latest version as last known good");
        }

        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use crate::descriptor::Locator;
    use crate::test_utils::Harness;
    use crate::Error;

    #[test]
    fn test_spec_for_scans_ranges_in_reverse() {
        let harness = Harness::new();
        let engine = harness.engine();

        let legacy = engine.spec_for(&Locator::new("yarn", "1.22.19")).unwrap();
        assert!(legacy.url.contains("yarn-{}.tgz"));

        let modern = engine.spec_for(&Locator::new("yarn", "4.1.0+sha512.abc")).unwrap();
        assert!(modern.url.contains("repo.example.com"));
    }

    #[test]
    fn test_spec_for_prerelease() {
        let harness = Harness::new();
        let engine = harness.engine();
        let spec = engine.spec_for(&Locator::new("yarn", "3.0.0-rc.1")).unwrap();
        assert!(spec.url.contains("repo.example.com"));
    }

    #[test]
    fn test_spec_for_custom_url() {
        let harness = Harness::new();
        let engine = harness.engine();
        let spec = engine
            .spec_for(&Locator::new("mypm", "https://example.com/mypm-1.0.0.tgz"))
            .unwrap();
        assert_eq!(spec.url, "https://example.com/mypm-1.0.0.tgz");
        assert!(spec.bin.is_none());
    }

    #[test]
    fn test_spec_for_unmatched_reference_is_assertion() {
        let harness = Harness::new();
        let engine = harness.engine();
        let err = engine.spec_for(&Locator::new("pnpm", "1.0.0")).unwrap_err();
        assert!(matches!(err, Error::AssertionFailure { .. }));
    }
}
