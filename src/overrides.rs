//! Local override store for debug-mode apps
//!
//! Debug mode substitutes a user-supplied app list for the remote catalog.
//! The imported list lives in the durable store as one JSON blob; whether
//! the debug path is taken at all is decided by [`SessionConfig`].
//!
//! Saving is all-or-nothing: every imported entry has its basic info
//! resolved against its own backend, in parallel, before anything is
//! written.

use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;
use uuid::Uuid;

use crate::api::{ApiFactory, ManifestSource, RequestOptions};
use crate::error::{DifyChatError, Result};
use crate::models::AppDescriptor;
use crate::session::SessionConfig;
use crate::storage::{KeyValueStore, StorageKey};

/// Placeholder credentials offered as a starting point for imports
const TEMPLATE_API_BASE: &str = "https://api.dify.ai/v1";
const TEMPLATE_API_KEY: &str = "app-your-api-key-here";

/// Outcome of [`LocalOverrideStore::save_debug_apps`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The payload was blank and the stored apps were removed
    Cleared,
    /// The apps were resolved and persisted
    Saved(Vec<AppDescriptor>),
}

/// Debug-mode app persistence and resolution
pub struct LocalOverrideStore {
    session: Arc<SessionConfig>,
    local: Arc<dyn KeyValueStore>,
    manifests: Arc<dyn ManifestSource>,
    api_factory: Arc<dyn ApiFactory>,
}

impl LocalOverrideStore {
    /// Create a store
    ///
    /// # Arguments
    ///
    /// * `session` - resolved session flags
    /// * `local` - durable store holding the imported apps and user group
    /// * `manifests` - source of the license manifest
    /// * `api_factory` - builds one-off clients for info lookups
    pub fn new(
        session: Arc<SessionConfig>,
        local: Arc<dyn KeyValueStore>,
        manifests: Arc<dyn ManifestSource>,
        api_factory: Arc<dyn ApiFactory>,
    ) -> Self {
        Self {
            session,
            local,
            manifests,
            api_factory,
        }
    }

    /// Whether debug-mode resolution is active
    pub fn is_debug_mode(&self) -> bool {
        self.session.is_debug_mode()
    }

    /// Apps offered in debug mode, filtered by the user's license group
    ///
    /// Returns an empty list without touching the network when debug mode
    /// is off or nothing was imported. Manifest failures are logged and
    /// also yield an empty list; this never fails.
    pub async fn get_debug_apps(&self) -> Vec<AppDescriptor> {
        if !self.is_debug_mode() {
            return Vec::new();
        }

        match self.local.get(StorageKey::DebugApps) {
            Ok(Some(_)) => {}
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::error!("Failed to read debug apps: {:#}", e);
                return Vec::new();
            }
        }

        let group = match self.local.get(StorageKey::UserGroup) {
            Ok(group) => group.unwrap_or_default(),
            Err(e) => {
                tracing::error!("Failed to read user group: {:#}", e);
                return Vec::new();
            }
        };

        match self.manifests.license_manifest().await {
            Ok(apps) => {
                let licensed: Vec<_> = apps
                    .into_iter()
                    .filter(|app| app.is_licensed_for(&group))
                    .collect();
                tracing::debug!(group = %group, count = licensed.len(), "Resolved debug apps");
                licensed
            }
            Err(e) => {
                tracing::error!("Fail to parse app config: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Apps exactly as last saved, for editing
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read or the blob is corrupt
    pub fn stored_debug_apps(&self) -> Result<Vec<AppDescriptor>> {
        match self.local.get(StorageKey::DebugApps)? {
            Some(blob) => {
                let apps = serde_json::from_str(&blob).map_err(|e| {
                    DifyChatError::Storage(format!("Stored debug apps are corrupt: {}", e))
                })?;
                Ok(apps)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Parse, resolve and persist an imported app list
    ///
    /// A blank payload clears the stored apps. Otherwise the payload must
    /// be a JSON array; entries without an id get a fresh one. Info for
    /// every entry is fetched in parallel with the entry's own
    /// credentials, and the list is written in one go only if every
    /// lookup succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`DifyChatError::Validation`] for malformed payloads and the
    /// lookup error when any info request fails. Storage is untouched in
    /// both cases.
    pub async fn save_debug_apps(&self, text: &str) -> Result<SaveOutcome> {
        let text = text.trim();
        if text.is_empty() {
            self.clear_debug_apps()?;
            return Ok(SaveOutcome::Cleared);
        }

        let mut apps = parse_import(text)?;
        let user = self.local.get(StorageKey::UserId)?.unwrap_or_default();

        let lookups = apps.iter().map(|app| {
            let api = self
                .api_factory
                .create(RequestOptions::direct(&user, &app.request_config));
            let id = app.id.clone();
            async move {
                api.get_app_info().await.map_err(|e| {
                    tracing::warn!(app_id = %id, "Debug app info lookup failed: {:#}", e);
                    e
                })
            }
        });
        let infos = try_join_all(lookups).await?;

        for (app, info) in apps.iter_mut().zip(infos) {
            app.info = Some(info);
        }

        let blob = serde_json::to_string(&apps)?;
        self.local.set(StorageKey::DebugApps, &blob)?;
        tracing::info!(count = apps.len(), "Saved debug apps");
        Ok(SaveOutcome::Saved(apps))
    }

    /// Remove the imported apps
    pub fn clear_debug_apps(&self) -> Result<()> {
        self.local.remove(StorageKey::DebugApps)
    }

    /// Remove the imported apps and leave debug mode
    ///
    /// With debug mode pinned by configuration only the apps are removed.
    /// Returns whether debug mode is still on afterwards.
    pub fn exit_debug_mode(&self) -> Result<bool> {
        self.clear_debug_apps()?;
        if !self.session.is_always_debug() {
            self.session.clear_debug()?;
        }
        Ok(self.is_debug_mode())
    }

    /// Example payload for the import editor
    pub fn example_template() -> String {
        let template = serde_json::json!([{
            "requestConfig": {
                "apiBase": TEMPLATE_API_BASE,
                "apiKey": TEMPLATE_API_KEY,
            }
        }]);
        serde_json::to_string_pretty(&template).unwrap_or_default()
    }
}

fn parse_import(text: &str) -> Result<Vec<AppDescriptor>> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| DifyChatError::Validation(format!("invalid Json: {}", e)))?;
    let Value::Array(entries) = value else {
        return Err(DifyChatError::Validation("Must be array".into()).into());
    };

    entries
        .into_iter()
        .map(|mut entry| {
            if let Some(obj) = entry.as_object_mut() {
                let missing = obj
                    .get("id")
                    .and_then(Value::as_str)
                    .map_or(true, |id| id.is_empty());
                if missing {
                    obj.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
                }
            }
            AppDescriptor::from_value(entry)
        })
        .collect()
}
