//! Session wiring
//!
//! A [`Workspace`] owns one instance of every session component and keeps
//! them in step. The conversation list is gated on the committed app: it
//! empties as soon as a switch begins, stays empty if the switch fails, and
//! is re-listed once the new app is ready. The upload and speech helpers
//! are always built from the parameters of the committed app.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::api::{
    ApiFactory, AppCatalog, ConversationApi, FilePayload, HttpApiFactory, HttpAppCatalog,
    HttpConversationApi, HttpManifestSource, ManifestSource,
};
use crate::app_session::{AppSessionController, AppState};
use crate::catalog::AppCatalogResolver;
use crate::config::Config;
use crate::conversations::ConversationStore;
use crate::error::{classify, DifyChatError, Result};
use crate::models::{CurrentApp, UploadedFile};
use crate::notify::Notifier;
use crate::overrides::LocalOverrideStore;
use crate::session::SessionConfig;
use crate::storage::{KeyValueStore, SledStore};
use crate::uploads::{Attachments, SpeechRecorder, UploadPipeline};

/// External services a workspace talks to
#[derive(Clone)]
pub struct Collaborators {
    /// Remote app catalog
    pub catalog: Arc<dyn AppCatalog>,
    /// Static manifests
    pub manifests: Arc<dyn ManifestSource>,
    /// Shared backend client, reconfigured on every switch
    pub api: Arc<dyn ConversationApi>,
    /// Builds one-off clients for lookups
    pub api_factory: Arc<dyn ApiFactory>,
}

impl Collaborators {
    /// HTTP implementations configured from `config`
    ///
    /// # Errors
    ///
    /// Returns error if an HTTP client cannot be built
    pub fn http(config: &Config) -> Result<Self> {
        let timeout = config.gateway.timeout_seconds;
        let list_limit = config.conversations.list_limit;
        Ok(Self {
            catalog: Arc::new(HttpAppCatalog::new(&config.catalog.url, timeout)?),
            manifests: Arc::new(HttpManifestSource::new(&config.manifests.base_url, timeout)?),
            api: Arc::new(HttpConversationApi::new(timeout, list_limit)?),
            api_factory: Arc::new(HttpApiFactory::new(timeout, list_limit)?),
        })
    }
}

/// Durable and session-scoped stores
#[derive(Clone)]
pub struct Stores {
    /// Survives restarts
    pub local: Arc<dyn KeyValueStore>,
    /// Wiped on logout and expiry
    pub session: Arc<dyn KeyValueStore>,
}

impl Stores {
    /// Open the sled database named by the configuration
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened
    pub fn open(config: &Config) -> Result<Self> {
        let scopes = match &config.storage.path {
            Some(path) => SledStore::open_with_path(path)?,
            None => SledStore::open_default()?,
        };
        Ok(Self {
            local: Arc::new(scopes.local),
            session: Arc::new(scopes.session),
        })
    }
}

/// One signed-in user's view of the apps and their conversations
pub struct Workspace {
    session: Arc<SessionConfig>,
    overrides: Arc<LocalOverrideStore>,
    resolver: Arc<AppCatalogResolver>,
    controller: AppSessionController,
    conversations: ConversationStore,
    uploads: UploadPipeline,
    api: Arc<dyn ConversationApi>,
    notifier: Notifier,
}

impl Workspace {
    /// Assemble a workspace from already-built parts
    ///
    /// # Arguments
    ///
    /// * `config` - loaded configuration
    /// * `user` - end-user id forwarded with every request
    /// * `parts` - external services
    /// * `stores` - durable and session stores
    /// * `debug_signal` - whether debug mode was requested on this launch
    /// * `notifier` - sink for user-facing messages
    ///
    /// # Errors
    ///
    /// Returns error if the session flags cannot be read
    pub fn from_parts(
        config: &Config,
        user: &str,
        parts: Collaborators,
        stores: Stores,
        debug_signal: bool,
        notifier: Notifier,
    ) -> Result<Self> {
        let session = Arc::new(SessionConfig::init(
            config.debug.always,
            debug_signal,
            stores.session.clone(),
        )?);
        let overrides = Arc::new(LocalOverrideStore::new(
            session.clone(),
            stores.local.clone(),
            parts.manifests.clone(),
            parts.api_factory.clone(),
        ));
        let resolver = Arc::new(
            AppCatalogResolver::new(
                session.clone(),
                overrides.clone(),
                parts.catalog.clone(),
                parts.api_factory.clone(),
                config.catalog.validation,
            )
            .with_identity(user, &config.gateway.base_url),
        );
        let controller = AppSessionController::new(
            parts.api.clone(),
            resolver.clone(),
            session.clone(),
            notifier.clone(),
            user,
            &config.gateway.base_url,
        );
        let conversations = ConversationStore::new(
            parts.api.clone(),
            notifier.clone(),
            &config.conversations.default_name,
        )
        .gated_by(controller.subscribe());
        let uploads = UploadPipeline::new(
            parts.api.clone(),
            Duration::from_millis(config.uploads.progress_tick_ms),
        );

        Ok(Self {
            session,
            overrides,
            resolver,
            controller,
            conversations,
            uploads,
            api: parts.api,
            notifier,
        })
    }

    /// Assemble a workspace backed by HTTP services and the sled store
    ///
    /// # Errors
    ///
    /// Returns error if a client or the store cannot be opened
    pub fn connect(
        config: &Config,
        user: &str,
        stores: Stores,
        debug_signal: bool,
        notifier: Notifier,
    ) -> Result<Self> {
        let parts = Collaborators::http(config)?;
        Self::from_parts(config, user, parts, stores, debug_signal, notifier)
    }

    /// Mount the apps and, once one is ready, list its conversations
    ///
    /// # Arguments
    ///
    /// * `app_id` - app to open; the previous or first app when `None`
    /// * `open_new` - add a provisional conversation after the listing
    ///
    /// # Errors
    ///
    /// Returns error if the app list cannot be resolved or the id is
    /// unknown. A listing failure is notified and not returned.
    pub async fn open_app(&self, app_id: Option<&str>, open_new: bool) -> Result<AppState> {
        let state = self.controller.mount(app_id).await?;
        self.after_switch(&state, open_new).await;
        Ok(state)
    }

    /// Switch to another mounted app
    ///
    /// # Errors
    ///
    /// Returns [`DifyChatError::AppNotFound`] for an unknown id
    pub async fn switch_app(&self, app_id: &str) -> Result<AppState> {
        let state = self.controller.select_app(app_id).await?;
        self.after_switch(&state, false).await;
        Ok(state)
    }

    async fn after_switch(&self, state: &AppState, open_new: bool) {
        if !state.is_ready() {
            return;
        }
        // Failures were already notified by the store
        if let Err(e) = self.conversations.initialize(open_new).await {
            tracing::debug!("Conversation listing failed: {:#}", e);
        }
    }

    /// The committed app
    ///
    /// # Errors
    ///
    /// Returns [`DifyChatError::Validation`] while nothing is committed
    pub fn require_app(&self) -> Result<CurrentApp> {
        self.controller
            .current_app()
            .ok_or_else(|| DifyChatError::Validation("No app is ready".into()).into())
    }

    /// Empty attachment list for the committed app
    ///
    /// # Errors
    ///
    /// Returns error while nothing is committed
    pub fn attachments(&self) -> Result<Attachments> {
        Ok(Attachments::new(self.require_app()?.parameters.file_upload))
    }

    /// Speech recorder for the committed app
    ///
    /// # Errors
    ///
    /// Returns error while nothing is committed
    pub fn recorder(&self) -> Result<SpeechRecorder> {
        let app = self.require_app()?;
        Ok(SpeechRecorder::new(
            self.api.clone(),
            &app.parameters.speech_to_text,
            self.notifier.clone(),
        ))
    }

    /// Attach and upload one file to the committed app
    ///
    /// Progress is mirrored to `progress` while the upload runs; the
    /// attachment entry records the outcome.
    ///
    /// # Errors
    ///
    /// Returns the rejection or upload error
    pub async fn attach(
        &self,
        attachments: &mut Attachments,
        file: FilePayload,
        progress: Option<watch::Sender<u8>>,
    ) -> Result<UploadedFile> {
        let (uid, sender) = match attachments.begin(&file) {
            Ok(started) => started,
            Err(e) => {
                self.notifier.error(notice_text(&e));
                return Err(e);
            }
        };
        if let Some(mirror) = progress {
            let mut rx = sender.subscribe();
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let value = *rx.borrow();
                    mirror.send_replace(value);
                }
            });
        }
        let settings = attachments.settings().clone();
        let result = self.uploads.upload(&settings, file, &sender).await;
        attachments.finish(uid, &result);
        if let Err(e) = &result {
            self.notifier.error(notice_text(e));
        }
        result
    }

    /// Session flags
    pub fn session(&self) -> &Arc<SessionConfig> {
        &self.session
    }

    /// Debug-app store
    pub fn overrides(&self) -> &Arc<LocalOverrideStore> {
        &self.overrides
    }

    /// App resolver
    pub fn resolver(&self) -> &Arc<AppCatalogResolver> {
        &self.resolver
    }

    /// App switcher
    pub fn controller(&self) -> &AppSessionController {
        &self.controller
    }

    /// Conversation list of the committed app
    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }
}

fn notice_text(e: &anyhow::Error) -> String {
    match classify(e) {
        Some(DifyChatError::Validation(message)) => message.clone(),
        _ => format!("{:#}", e),
    }
}
