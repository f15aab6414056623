//! App catalog resolution
//!
//! Produces the apps a user may pick. In debug mode the imported,
//! license-filtered apps are returned verbatim; otherwise the remote
//! catalog is fetched and filtered by [`DisplayPolicy`].

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::api::{ApiFactory, AppCatalog, RequestOptions};
use crate::error::{DifyChatError, Result};
use crate::models::AppDescriptor;
use crate::overrides::LocalOverrideStore;
use crate::session::SessionConfig;

/// How catalog entries are judged usable
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStrategy {
    /// Trust the catalog's `isEnabled` flag
    #[default]
    EnabledFlag,
    /// Fetch parameters and site settings for every entry and disable the
    /// ones that fail; one round trip pair per app
    Full,
}

/// Which entries a listing keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPolicy {
    /// Only entries with a truthy `isEnabled` (app switcher)
    SelectableOnly,
    /// Every entry; disabled ones are rendered greyed out (app list page)
    IncludeDisabled,
}

impl DisplayPolicy {
    fn keeps(self, app: &AppDescriptor) -> bool {
        match self {
            DisplayPolicy::SelectableOnly => app.is_enabled(),
            DisplayPolicy::IncludeDisabled => true,
        }
    }
}

/// Merges the remote catalog with debug-mode overrides
pub struct AppCatalogResolver {
    session: Arc<SessionConfig>,
    overrides: Arc<LocalOverrideStore>,
    catalog: Arc<dyn AppCatalog>,
    api_factory: Arc<dyn ApiFactory>,
    strategy: ValidationStrategy,
    user: String,
    gateway_base: String,
}

impl AppCatalogResolver {
    /// Create a resolver
    pub fn new(
        session: Arc<SessionConfig>,
        overrides: Arc<LocalOverrideStore>,
        catalog: Arc<dyn AppCatalog>,
        api_factory: Arc<dyn ApiFactory>,
        strategy: ValidationStrategy,
    ) -> Self {
        Self {
            session,
            overrides,
            catalog,
            api_factory,
            strategy,
            user: String::new(),
            gateway_base: String::new(),
        }
    }

    /// Identity and gateway used by the full validation strategy
    pub fn with_identity(mut self, user: impl Into<String>, gateway_base: impl Into<String>) -> Self {
        self.user = user.into();
        self.gateway_base = gateway_base.into();
        self
    }

    /// Active validation strategy
    pub fn strategy(&self) -> ValidationStrategy {
        self.strategy
    }

    /// Resolve the apps visible to the current user
    ///
    /// # Errors
    ///
    /// Returns the catalog error in normal mode; debug mode never fails.
    pub async fn resolve(&self, policy: DisplayPolicy) -> Result<Vec<AppDescriptor>> {
        if self.session.is_debug_mode() {
            return Ok(self.overrides.get_debug_apps().await);
        }

        let apps = self.catalog.fetch_apps().await?;
        let apps = match self.strategy {
            ValidationStrategy::EnabledFlag => apps,
            ValidationStrategy::Full => self.validate_all(apps).await,
        };

        let total = apps.len();
        let visible: Vec<_> = apps.into_iter().filter(|a| policy.keeps(a)).collect();
        tracing::debug!(total, visible = visible.len(), ?policy, "Resolved app catalog");
        Ok(visible)
    }

    /// Find one selectable app by id
    ///
    /// # Errors
    ///
    /// Returns [`DifyChatError::AppNotFound`] if the id is not selectable
    pub async fn find_app(&self, app_id: &str) -> Result<AppDescriptor> {
        self.resolve(DisplayPolicy::SelectableOnly)
            .await?
            .into_iter()
            .find(|a| a.id == app_id)
            .ok_or_else(|| DifyChatError::AppNotFound(app_id.to_string()).into())
    }

    async fn validate_all(&self, apps: Vec<AppDescriptor>) -> Vec<AppDescriptor> {
        let checks = apps.into_iter().map(|mut app| async move {
            let api = self.api_factory.create(RequestOptions::for_app(
                &self.user,
                &app,
                false,
                &self.gateway_base,
            ));
            let (parameters, site) =
                futures::join!(api.get_app_parameters(), api.get_app_site_setting());
            if let Err(e) = &site {
                tracing::debug!(app_id = %app.id, "Site settings unavailable: {:#}", e);
            }
            match parameters {
                Ok(_) => {
                    if app.is_enabled.is_none() {
                        app.is_enabled = Some(1);
                    }
                }
                Err(e) => {
                    tracing::warn!(app_id = %app.id, "Disabling app: {:#}", e);
                    app.is_enabled = Some(0);
                }
            }
            app
        });
        join_all(checks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{app, FakeApiFactory, FakeBackend, FakeCatalog, FakeManifests};
    use crate::storage::{KeyValueStore, MemoryStore, StorageKey};

    fn resolver(
        debug: bool,
        catalog: FakeCatalog,
        strategy: ValidationStrategy,
    ) -> (AppCatalogResolver, Arc<FakeCatalog>, Arc<FakeBackend>, Arc<MemoryStore>) {
        let local = Arc::new(MemoryStore::new());
        let session =
            Arc::new(SessionConfig::init(debug, false, Arc::new(MemoryStore::new())).unwrap());
        let backend = FakeBackend::new();
        let factory = Arc::new(FakeApiFactory::new(backend.clone()));
        let manifests = Arc::new(FakeManifests::default());
        let mut licensed = app("licensed");
        if let Some(info) = licensed.info.as_mut() {
            info.tags = vec!["teamX".into()];
        }
        *manifests.license.lock().unwrap() = Some(vec![licensed]);
        let overrides = Arc::new(LocalOverrideStore::new(
            session.clone(),
            local.clone(),
            manifests,
            factory.clone(),
        ));
        let catalog = Arc::new(catalog);
        let resolver = AppCatalogResolver::new(session, overrides, catalog.clone(), factory, strategy)
            .with_identity("me@example.com", "https://gw.example");
        (resolver, catalog, backend, local)
    }

    fn with_flag(id: &str, flag: Option<u8>) -> AppDescriptor {
        let mut a = app(id);
        a.is_enabled = flag;
        a
    }

    fn mixed_catalog() -> FakeCatalog {
        FakeCatalog::with_apps(vec![
            with_flag("on", Some(1)),
            with_flag("off", Some(0)),
            with_flag("unset", None),
        ])
    }

    #[tokio::test]
    async fn test_normal_mode_keeps_only_enabled_entries() {
        let (resolver, _, backend, _) = resolver(false, mixed_catalog(), ValidationStrategy::EnabledFlag);
        let apps = resolver.resolve(DisplayPolicy::SelectableOnly).await.unwrap();
        let ids: Vec<_> = apps.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["on"]);
        assert!(apps.iter().all(|a| a.is_enabled()));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_include_disabled_policy_keeps_everything() {
        let (resolver, _, _, _) = resolver(false, mixed_catalog(), ValidationStrategy::EnabledFlag);
        let apps = resolver.resolve(DisplayPolicy::IncludeDisabled).await.unwrap();
        assert_eq!(apps.len(), 3);
        assert!(apps.iter().any(|a| a.is_disabled()));
    }

    #[tokio::test]
    async fn test_debug_mode_bypasses_catalog() {
        let (resolver, catalog, _, local) = resolver(true, mixed_catalog(), ValidationStrategy::EnabledFlag);
        local.set(StorageKey::DebugApps, "[]").unwrap();
        local.set(StorageKey::UserGroup, "teamX").unwrap();

        let apps = resolver.resolve(DisplayPolicy::SelectableOnly).await.unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].id, "licensed");
        assert_eq!(catalog.fetches(), 0);
    }

    #[tokio::test]
    async fn test_catalog_failure_propagates() {
        let (resolver, _, _, _) = resolver(false, FakeCatalog::failing(), ValidationStrategy::EnabledFlag);
        assert!(resolver.resolve(DisplayPolicy::SelectableOnly).await.is_err());
    }

    #[tokio::test]
    async fn test_full_validation_disables_failing_apps() {
        let (resolver, _, backend, _) = resolver(false, mixed_catalog(), ValidationStrategy::Full);
        backend.fail("parameters:https://gw.example/on");

        let apps = resolver.resolve(DisplayPolicy::IncludeDisabled).await.unwrap();
        let flag = |id: &str| apps.iter().find(|a| a.id == id).and_then(|a| a.is_enabled);
        assert_eq!(flag("on"), Some(0));
        assert_eq!(flag("off"), Some(0));
        assert_eq!(flag("unset"), Some(1));
        assert_eq!(backend.count("parameters:"), 3);
    }

    #[tokio::test]
    async fn test_find_app_reports_missing_id() {
        let (resolver, _, _, _) = resolver(false, mixed_catalog(), ValidationStrategy::EnabledFlag);
        assert_eq!(resolver.find_app("on").await.unwrap().id, "on");

        let err = resolver.find_app("off").await.unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(DifyChatError::AppNotFound(_))
        ));
    }
}
