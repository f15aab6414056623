//! Active app selection and its remote configuration
//!
//! [`AppSessionController`] owns which app is active. Selecting an app
//! reconfigures the shared [`ConversationApi`] in place and fetches the
//! app's parameters and site settings; the pair is committed as one
//! [`CurrentApp`] only if the app is still the one selected when both
//! results are in.
//!
//! Switches are serialized: the selection itself is recorded
//! synchronously in a [`LatestValue`], while reconfiguring the client and
//! the fetches that depend on it run under an async mutex. A load whose
//! app is no longer selected when it gets the lock is skipped, and one
//! that finishes after the selection moved on is discarded.

use std::sync::{Arc, RwLock};

use tokio::sync::{watch, Mutex};

use crate::api::{ConversationApi, RequestOptions};
use crate::catalog::{AppCatalogResolver, DisplayPolicy};
use crate::error::{DifyChatError, Result};
use crate::models::{AppDescriptor, AppSiteSettings, CurrentApp};
use crate::notify::Notifier;
use crate::session::{LatestValue, SessionConfig};

/// Lifecycle of the active app
#[derive(Debug, Clone, PartialEq)]
pub enum AppState {
    /// Nothing selected (no apps, or not mounted yet)
    Idle,
    /// Parameters and site settings are being fetched
    Loading {
        /// App being loaded
        app_id: String,
    },
    /// Fully loaded
    Ready(CurrentApp),
    /// The parameter fetch failed; the app stays selected and retryable
    Failed {
        /// App that failed to load
        app_id: String,
        /// Failure description
        error: String,
    },
}

impl AppState {
    /// Whether an app is loaded and usable
    pub fn is_ready(&self) -> bool {
        matches!(self, AppState::Ready(_))
    }
}

/// Owner of the active app
pub struct AppSessionController {
    api: Arc<dyn ConversationApi>,
    resolver: Arc<AppCatalogResolver>,
    session: Arc<SessionConfig>,
    notifier: Notifier,
    user: String,
    gateway_base: String,
    apps: RwLock<Vec<AppDescriptor>>,
    selected: LatestValue<Option<String>>,
    switch_lock: Mutex<()>,
    state: watch::Sender<AppState>,
    current: watch::Sender<Option<CurrentApp>>,
}

impl AppSessionController {
    /// Create a controller in the `Idle` state
    ///
    /// # Arguments
    ///
    /// * `api` - the shared client, reconfigured on every switch
    /// * `resolver` - source of the selectable apps
    /// * `session` - resolved session flags (decides direct vs routed)
    /// * `notifier` - sink for user-facing failures
    /// * `user` - end-user id forwarded with every request
    /// * `gateway_base` - shared gateway for routed requests
    pub fn new(
        api: Arc<dyn ConversationApi>,
        resolver: Arc<AppCatalogResolver>,
        session: Arc<SessionConfig>,
        notifier: Notifier,
        user: impl Into<String>,
        gateway_base: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(AppState::Idle);
        let (current, _) = watch::channel(None);
        Self {
            api,
            resolver,
            session,
            notifier,
            user: user.into(),
            gateway_base: gateway_base.into(),
            apps: RwLock::new(Vec::new()),
            selected: LatestValue::new(None),
            switch_lock: Mutex::new(()),
            state,
            current,
        }
    }

    /// Load the selectable apps and activate one of them
    ///
    /// Picks `path_app_id` when given, else the previous selection if it is
    /// still listed, else the first app. With no apps the controller stays
    /// `Idle`.
    ///
    /// # Errors
    ///
    /// Returns error if the app list cannot be resolved or `path_app_id`
    /// is not one of the selectable apps.
    pub async fn mount(&self, path_app_id: Option<&str>) -> Result<AppState> {
        let apps = match self.resolver.resolve(DisplayPolicy::SelectableOnly).await {
            Ok(apps) => apps,
            Err(e) => {
                self.notifier.error(format!("Fail to get apps: {}", e));
                self.go_idle();
                return Err(e);
            }
        };
        *self.apps.write().unwrap_or_else(|p| p.into_inner()) = apps.clone();

        let previous = self.selected.get();
        let target = match path_app_id {
            Some(id) => Some(id.to_string()),
            None => previous
                .filter(|id| apps.iter().any(|a| &a.id == id))
                .or_else(|| apps.first().map(|a| a.id.clone())),
        };

        let Some(app_id) = target else {
            self.notifier.info("No available apps");
            self.go_idle();
            return Ok(AppState::Idle);
        };

        self.select_app(&app_id).await
    }

    /// Switch to another app and load it
    ///
    /// # Errors
    ///
    /// Returns [`DifyChatError::AppNotFound`] if the id is not one of the
    /// mounted apps. Fetch failures are not errors; they end in
    /// [`AppState::Failed`].
    pub async fn select_app(&self, app_id: &str) -> Result<AppState> {
        let app = self
            .find(app_id)
            .ok_or_else(|| DifyChatError::AppNotFound(app_id.to_string()))?;
        self.begin(&app.id);
        Ok(self.load(app).await)
    }

    /// Reload the currently selected app
    ///
    /// # Errors
    ///
    /// Returns error if nothing is selected
    pub async fn retry(&self) -> Result<AppState> {
        let app_id = self
            .selected
            .get()
            .ok_or_else(|| DifyChatError::Validation("No app selected".into()))?;
        self.select_app(&app_id).await
    }

    /// The committed app, `None` while loading or after a failure
    pub fn current_app(&self) -> Option<CurrentApp> {
        self.current.borrow().clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> AppState {
        self.state.borrow().clone()
    }

    /// Id of the most recent selection, possibly still loading
    pub fn selected_app_id(&self) -> Option<String> {
        self.selected.get()
    }

    /// Apps offered by the switcher
    pub fn apps(&self) -> Vec<AppDescriptor> {
        self.apps.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Receiver of every committed [`CurrentApp`] change
    pub fn subscribe(&self) -> watch::Receiver<Option<CurrentApp>> {
        self.current.subscribe()
    }

    /// Receiver of every state change
    pub fn subscribe_state(&self) -> watch::Receiver<AppState> {
        self.state.subscribe()
    }

    fn find(&self, app_id: &str) -> Option<AppDescriptor> {
        self.apps
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .find(|a| a.id == app_id)
            .cloned()
    }

    fn go_idle(&self) {
        self.current.send_replace(None);
        self.state.send_replace(AppState::Idle);
    }

    fn begin(&self, app_id: &str) {
        self.selected.set(Some(app_id.to_string()));
        self.current.send_replace(None);
        self.state.send_replace(AppState::Loading {
            app_id: app_id.to_string(),
        });
    }

    async fn load(&self, app: AppDescriptor) -> AppState {
        let _guard = self.switch_lock.lock().await;
        let wanted = Some(app.id.clone());
        if !self.selected.is(&wanted) {
            tracing::debug!(app_id = %app.id, "Skipping superseded app load");
            return self.state();
        }

        let options = RequestOptions::for_app(
            &self.user,
            &app,
            self.session.is_debug_mode(),
            &self.gateway_base,
        );
        self.api.update_options(options);

        let (parameters, site) = futures::join!(
            self.api.get_app_parameters(),
            self.api.get_app_site_setting()
        );
        let site = site.unwrap_or_else(|e| {
            tracing::warn!(
                app_id = %app.id,
                "Fail to get site settings, please confirm Dify >= v1.4.0: {:#}",
                e
            );
            AppSiteSettings::default()
        });

        if !self.selected.is(&wanted) {
            tracing::debug!(app_id = %app.id, "Discarding stale app load");
            return self.state();
        }

        match parameters {
            Ok(parameters) => {
                let current = CurrentApp {
                    config: app,
                    parameters,
                    site,
                };
                tracing::info!(app_id = %current.id(), "App ready");
                self.current.send_replace(Some(current.clone()));
                self.state.send_replace(AppState::Ready(current));
            }
            Err(e) => {
                self.notifier.error(format!("Fail to get parameters: {}", e));
                self.current.send_replace(None);
                self.state.send_replace(AppState::Failed {
                    app_id: app.id,
                    error: e.to_string(),
                });
            }
        }
        self.state()
    }
}
