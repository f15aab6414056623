//! Collaborator capabilities consumed by the session core
//!
//! The backend API, the remote app catalog and the static manifests are
//! external services. This module defines the narrow traits the core
//! depends on; concrete `reqwest` implementations live in submodules:
//!
//! - [`http::HttpConversationApi`]: per-app backend client whose
//!   credentials are swapped in place on every app switch.
//! - [`catalog::HttpAppCatalog`]: canonical app list endpoint.
//! - [`manifest::HttpManifestSource`]: license, passcode and link
//!   manifests served as static JSON.
//! - [`fake`]: in-process fakes used in unit tests (cfg(test) only).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    AppDescriptor, AppInfo, AppParameters, AppSiteSettings, ConversationSummary, ExternalLink,
    RequestConfig, UploadedFile,
};

pub mod catalog;
pub mod http;
pub mod manifest;

#[cfg(test)]
pub mod fake;

pub use catalog::HttpAppCatalog;
pub use http::{HttpApiFactory, HttpConversationApi};
pub use manifest::HttpManifestSource;

/// Options the backend client sends with every request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// End-user identifier forwarded to the backend
    pub user: String,
    /// Base URL requests are issued against
    pub api_base: String,
    /// Bearer credential
    pub api_key: String,
}

impl RequestOptions {
    /// Use an app's raw credentials directly
    pub fn direct(user: &str, config: &RequestConfig) -> Self {
        Self {
            user: user.to_string(),
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Route through the shared gateway under the app's id
    ///
    /// The gateway injects the real credentials, so the base becomes
    /// `{gateway}/{app_id}` and the raw base is never used.
    pub fn routed(user: &str, config: &RequestConfig, gateway_base: &str, app_id: &str) -> Self {
        Self {
            user: user.to_string(),
            api_base: format!("{}/{}", gateway_base.trim_end_matches('/'), app_id),
            api_key: config.api_key.clone(),
        }
    }

    /// Options for `app` in the current mode
    ///
    /// Debug apps carry raw credentials the gateway knows nothing about, so
    /// they are always used directly.
    pub fn for_app(user: &str, app: &AppDescriptor, debug: bool, gateway_base: &str) -> Self {
        if debug || gateway_base.trim().is_empty() {
            Self::direct(user, &app.request_config)
        } else {
            Self::routed(user, &app.request_config, gateway_base, &app.id)
        }
    }
}

/// File contents handed to the upload endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePayload {
    /// File name including extension
    pub name: String,
    /// MIME type, when known
    pub mime_type: Option<String>,
    /// Raw bytes
    pub bytes: Vec<u8>,
}

impl FilePayload {
    /// Extension of the file name without the dot, if any
    pub fn extension(&self) -> Option<&str> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            None
        } else {
            Some(ext)
        }
    }
}

/// Backend API for the active app
///
/// One instance is shared across the session and reconfigured in place
/// with [`ConversationApi::update_options`] on every app switch; every
/// request uses the options current at the moment it is issued.
#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// Replace the request options in place
    fn update_options(&self, options: RequestOptions);

    /// Options currently applied
    fn options(&self) -> RequestOptions;

    /// Basic app metadata
    async fn get_app_info(&self) -> Result<AppInfo>;

    /// Behavioral parameters
    async fn get_app_parameters(&self) -> Result<AppParameters>;

    /// Site settings; older backends answer 404
    async fn get_app_site_setting(&self) -> Result<AppSiteSettings>;

    /// Conversations of the current user, newest first
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>>;

    /// Rename a persisted conversation
    async fn rename_conversation(&self, conversation_id: &str, name: &str) -> Result<()>;

    /// Delete a persisted conversation
    async fn delete_conversation(&self, conversation_id: &str) -> Result<()>;

    /// Upload an attachment
    async fn upload_file(&self, file: FilePayload) -> Result<UploadedFile>;

    /// Transcribe recorded audio
    async fn audio_to_text(&self, audio: Vec<u8>) -> Result<String>;
}

/// Creates standalone API instances for one-off lookups
///
/// Used where a lookup must not disturb the shared session client, e.g.
/// resolving info for every imported debug app in parallel.
pub trait ApiFactory: Send + Sync {
    /// Build an instance bound to `options`
    fn create(&self, options: RequestOptions) -> Arc<dyn ConversationApi>;
}

/// Canonical remote app catalog
#[async_trait]
pub trait AppCatalog: Send + Sync {
    /// Every app the catalog knows about
    async fn fetch_apps(&self) -> Result<Vec<AppDescriptor>>;
}

/// Static JSON manifests served next to the client
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// License manifest: app descriptors carrying `info.tags`
    async fn license_manifest(&self) -> Result<Vec<AppDescriptor>>;

    /// User group to numeric passcode, in document order
    async fn passcode_manifest(&self) -> Result<Vec<(String, i64)>>;

    /// Links offered to internal groups
    async fn links(&self) -> Result<Vec<ExternalLink>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RequestConfig {
        RequestConfig {
            api_base: "https://api.dify.ai/v1".into(),
            api_key: "app-key".into(),
        }
    }

    #[test]
    fn test_direct_options_use_raw_credentials() {
        let opts = RequestOptions::direct("u1", &config());
        assert_eq!(opts.api_base, "https://api.dify.ai/v1");
        assert_eq!(opts.api_key, "app-key");
        assert_eq!(opts.user, "u1");
    }

    #[test]
    fn test_routed_options_key_base_by_app_id() {
        let opts = RequestOptions::routed("u1", &config(), "https://gw.example/", "app-7");
        assert_eq!(opts.api_base, "https://gw.example/app-7");
    }

    #[test]
    fn test_for_app_routes_only_outside_debug_mode() {
        let app = AppDescriptor {
            id: "app-7".into(),
            request_config: config(),
            info: None,
            is_enabled: Some(1),
        };
        let routed = RequestOptions::for_app("u1", &app, false, "https://gw.example");
        assert_eq!(routed.api_base, "https://gw.example/app-7");

        let direct = RequestOptions::for_app("u1", &app, true, "https://gw.example");
        assert_eq!(direct.api_base, "https://api.dify.ai/v1");

        let no_gateway = RequestOptions::for_app("u1", &app, false, "");
        assert_eq!(no_gateway.api_base, "https://api.dify.ai/v1");
    }

    #[test]
    fn test_file_payload_extension() {
        let file = |name: &str| FilePayload {
            name: name.into(),
            mime_type: None,
            bytes: vec![],
        };
        assert_eq!(file("report.pdf").extension(), Some("pdf"));
        assert_eq!(file("archive.tar.gz").extension(), Some("gz"));
        assert_eq!(file("README").extension(), None);
        assert_eq!(file(".hidden").extension(), None);
    }
}
