//! Installation and Last-Known-Good recording.

use tracing::{debug, info, instrument};

use crate::descriptor::{Descriptor, InstallSpec, Locator};
use crate::engine::Engine;
use crate::{Error, Result};

impl Engine {
    /// Install `locator` if needed and return it with a freshly verified hash.
    ///
    /// Any hash already present on the reference is replaced. URL references
    /// are returned unchanged.
    #[instrument(skip(self), fields(locator = %locator))]
    pub async fn ensure_package_manager(&self, locator: &Locator) -> Result<InstallSpec> {
        let spec = self.spec_for(locator)?;
        let info = self.installer.install_version(locator, &spec).await?;
        let locator = locator.with_hash(&info.hash);
        debug!(reference = %locator.reference, location = %info.location.display(), "Package manager ready");
        Ok(InstallSpec {
            locator,
            info,
            spec,
        })
    }

    /// Record `locator` as the tool's Last-Known-Good version.
    ///
    /// Returns whether the store was written; an unchanged value is a no-op.
    pub async fn activate(&self, locator: &Locator) -> Result<bool> {
        let mut snapshot = self.store.load().await?;
        if !snapshot.set(locator.name.clone(), locator.reference.clone()) {
            return Ok(false);
        }
        self.store.save(&snapshot).await?;
        info!(name = %locator.name, reference = %locator.reference, "Updated last known good");
        Ok(true)
    }

    /// Resolve and install `descriptor`, then make it the Last-Known-Good
    /// version used when nothing else is requested.
    #[instrument(skip(self), fields(descriptor = %descriptor))]
    pub async fn install_global(&self, descriptor: &Descriptor) -> Result<InstallSpec> {
        let locator = self
            .resolve_descriptor(descriptor, true, false)
            .await?
            .ok_or_else(|| Error::resolution_failed(&descriptor.name, &descriptor.range))?;
        let install = self.ensure_package_manager(&locator).await?;
        self.activate(&install.locator).await?;
        Ok(install)
    }
}

#[cfg(test)]
mod tests {
    use crate::descriptor::Locator;
    use crate::test_utils::{FIXTURE_HASH, Harness};

    #[tokio::test]
    async fn test_ensure_replaces_existing_hash() {
        let harness = Harness::new();
        let engine = harness.engine();

        let install = engine
            .ensure_package_manager(&Locator::new("yarn", "1.22.19+sha512.stale"))
            .await
            .unwrap();

        assert_eq!(install.locator.reference, format!("1.22.19+{}", FIXTURE_HASH));
        assert_eq!(harness.installer.installs(), vec![Locator::new("yarn", "1.22.19+sha512.stale")]);
    }

    #[tokio::test]
    async fn test_ensure_keeps_url_reference() {
        let harness = Harness::new();
        let engine = harness.engine();
        let url = "https://example.com/mypm-1.0.0.tgz";

        let install = engine
            .ensure_package_manager(&Locator::new("mypm", url))
            .await
            .unwrap();

        assert_eq!(install.locator.reference, url);
        assert_eq!(install.spec.url, url);
    }

    #[tokio::test]
    async fn test_activate_is_idempotent() {
        let harness = Harness::new();
        let engine = harness.engine();
        let locator = Locator::new("pnpm", "9.1.0");

        assert!(engine.activate(&locator).await.unwrap());
        assert!(!engine.activate(&locator).await.unwrap());

        assert_eq!(harness.store.writes(), 1);
        assert_eq!(harness.store.snapshot().get("pnpm"), Some("9.1.0"));
    }
}
