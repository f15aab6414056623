//! In-process fakes for unit tests
//!
//! [`FakeBackend`] holds the server-side state shared by every
//! [`FakeConversationApi`] instance created from it, so tests can observe
//! which credentials each call was issued with. Gates let a test hold a
//! request in flight and release it later to exercise interleavings.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{ApiFactory, AppCatalog, ConversationApi, FilePayload, ManifestSource, RequestOptions};
use crate::error::{DifyChatError, Result};
use crate::models::{
    AppDescriptor, AppInfo, AppParameters, AppSiteSettings, ConversationId, ConversationSummary,
    ExternalLink, UploadedFile,
};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Server-side state behind the fake API
#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<String>>,
    conversations: Mutex<Vec<ConversationSummary>>,
    parameters: Mutex<HashMap<String, AppParameters>>,
    infos: Mutex<HashMap<String, AppInfo>>,
    failing: Mutex<HashSet<String>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    transcript: Mutex<Option<String>>,
}

impl FakeBackend {
    /// Create an empty backend
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call issued so far, as `op:detail`
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Number of calls whose name starts with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Replace the server-side conversation list
    pub fn set_conversations(&self, items: Vec<ConversationSummary>) {
        *lock(&self.conversations) = items;
    }

    /// Server-side conversation list
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        lock(&self.conversations).clone()
    }

    /// Register parameters served for `api_base`
    pub fn set_parameters(&self, api_base: &str, params: AppParameters) {
        lock(&self.parameters).insert(api_base.to_string(), params);
    }

    /// Register info served for `api_base`
    pub fn set_info(&self, api_base: &str, info: AppInfo) {
        lock(&self.infos).insert(api_base.to_string(), info);
    }

    /// Make an operation fail (`list`, `rename`, `delete`, `site`,
    /// `upload`, `audio`, or `parameters:<base>` / `info:<base>`)
    pub fn fail(&self, op: &str) {
        lock(&self.failing).insert(op.to_string());
    }

    /// Let a previously failing operation succeed again
    pub fn heal(&self, op: &str) {
        lock(&self.failing).remove(op);
    }

    /// Hold calls of `op` until the returned notify is signalled
    pub fn gate(&self, op: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        lock(&self.gates).insert(op.to_string(), Arc::clone(&notify));
        notify
    }

    /// Text returned by speech-to-text
    pub fn set_transcript(&self, text: &str) {
        *lock(&self.transcript) = Some(text.to_string());
    }

    async fn enter(&self, op: &str, detail: &str) -> Result<()> {
        lock(&self.calls).push(format!("{}:{}", op, detail));
        let keyed = format!("{}:{}", op, detail);
        let gate = {
            let gates = lock(&self.gates);
            gates.get(&keyed).or_else(|| gates.get(op)).cloned()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let failing = lock(&self.failing);
        if failing.contains(op) || failing.contains(&keyed) {
            return Err(DifyChatError::Network(format!("{} failed", keyed)).into());
        }
        Ok(())
    }
}

/// Fake API instance bound to one set of options
pub struct FakeConversationApi {
    backend: Arc<FakeBackend>,
    options: RwLock<RequestOptions>,
}

impl FakeConversationApi {
    /// Create an instance with empty options
    pub fn new(backend: Arc<FakeBackend>) -> Self {
        Self {
            backend,
            options: RwLock::new(RequestOptions::default()),
        }
    }
}

#[async_trait]
impl ConversationApi for FakeConversationApi {
    fn update_options(&self, options: RequestOptions) {
        *self.options.write().unwrap_or_else(|p| p.into_inner()) = options;
    }

    fn options(&self) -> RequestOptions {
        self.options
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    async fn get_app_info(&self) -> Result<AppInfo> {
        let base = self.options().api_base;
        self.backend.enter("info", &base).await?;
        lock(&self.backend.infos)
            .get(&base)
            .cloned()
            .ok_or_else(|| DifyChatError::Network(format!("no info for {}", base)).into())
    }

    async fn get_app_parameters(&self) -> Result<AppParameters> {
        let base = self.options().api_base;
        self.backend.enter("parameters", &base).await?;
        Ok(lock(&self.backend.parameters)
            .get(&base)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_app_site_setting(&self) -> Result<AppSiteSettings> {
        let base = self.options().api_base;
        self.backend.enter("site", &base).await?;
        Ok(AppSiteSettings {
            title: format!("site of {}", base),
            ..Default::default()
        })
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let base = self.options().api_base;
        self.backend.enter("list", &base).await?;
        Ok(self.backend.conversations())
    }

    async fn rename_conversation(&self, conversation_id: &str, name: &str) -> Result<()> {
        self.backend.enter("rename", conversation_id).await?;
        for item in lock(&self.backend.conversations).iter_mut() {
            if item.id.to_string() == conversation_id {
                item.name = name.to_string();
            }
        }
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.backend.enter("delete", conversation_id).await?;
        lock(&self.backend.conversations).retain(|c| c.id.to_string() != conversation_id);
        Ok(())
    }

    async fn upload_file(&self, file: FilePayload) -> Result<UploadedFile> {
        self.backend.enter("upload", &file.name).await?;
        Ok(UploadedFile {
            id: format!("file-{}", file.name),
            name: file.name,
            size: file.bytes.len() as u64,
            extension: String::new(),
            mime_type: file.mime_type.unwrap_or_default(),
        })
    }

    async fn audio_to_text(&self, audio: Vec<u8>) -> Result<String> {
        self.backend.enter("audio", &audio.len().to_string()).await?;
        Ok(lock(&self.backend.transcript).clone().unwrap_or_default())
    }
}

/// Factory handing out fakes that share one backend
pub struct FakeApiFactory {
    backend: Arc<FakeBackend>,
}

impl FakeApiFactory {
    /// Create a factory over `backend`
    pub fn new(backend: Arc<FakeBackend>) -> Self {
        Self { backend }
    }
}

impl ApiFactory for FakeApiFactory {
    fn create(&self, options: RequestOptions) -> Arc<dyn ConversationApi> {
        let api = FakeConversationApi::new(Arc::clone(&self.backend));
        api.update_options(options);
        Arc::new(api)
    }
}

/// Fake remote catalog
#[derive(Default)]
pub struct FakeCatalog {
    apps: Mutex<Option<Vec<AppDescriptor>>>,
    fetches: Mutex<usize>,
}

impl FakeCatalog {
    /// Catalog serving `apps`
    pub fn with_apps(apps: Vec<AppDescriptor>) -> Self {
        Self {
            apps: Mutex::new(Some(apps)),
            fetches: Mutex::new(0),
        }
    }

    /// Catalog whose fetch always fails
    pub fn failing() -> Self {
        Self::default()
    }

    /// Replace the served apps, `None` to fail
    pub fn set_apps(&self, apps: Option<Vec<AppDescriptor>>) {
        *lock(&self.apps) = apps;
    }

    /// Number of fetches so far
    pub fn fetches(&self) -> usize {
        *lock(&self.fetches)
    }
}

#[async_trait]
impl AppCatalog for FakeCatalog {
    async fn fetch_apps(&self) -> Result<Vec<AppDescriptor>> {
        *lock(&self.fetches) += 1;
        lock(&self.apps)
            .clone()
            .ok_or_else(|| DifyChatError::Network("catalog unavailable".into()).into())
    }
}

/// Fake manifest source
#[derive(Default)]
pub struct FakeManifests {
    /// License manifest, `None` to fail
    pub license: Mutex<Option<Vec<AppDescriptor>>>,
    /// Passcode manifest, `None` to fail
    pub passcodes: Mutex<Option<Vec<(String, i64)>>>,
    /// Link manifest
    pub links: Mutex<Vec<ExternalLink>>,
    fetches: Mutex<usize>,
}

impl FakeManifests {
    /// Number of manifest fetches so far
    pub fn fetches(&self) -> usize {
        *lock(&self.fetches)
    }
}

#[async_trait]
impl ManifestSource for FakeManifests {
    async fn license_manifest(&self) -> Result<Vec<AppDescriptor>> {
        *lock(&self.fetches) += 1;
        lock(&self.license)
            .clone()
            .ok_or_else(|| DifyChatError::Network("app_config.json unavailable".into()).into())
    }

    async fn passcode_manifest(&self) -> Result<Vec<(String, i64)>> {
        *lock(&self.fetches) += 1;
        lock(&self.passcodes)
            .clone()
            .ok_or_else(|| DifyChatError::Network("user_config.json unavailable".into()).into())
    }

    async fn links(&self) -> Result<Vec<ExternalLink>> {
        *lock(&self.fetches) += 1;
        Ok(lock(&self.links).clone())
    }
}

/// Persisted summary with a fixed id
pub fn persisted(id: &str, name: &str) -> ConversationSummary {
    ConversationSummary {
        id: ConversationId::Persisted(id.to_string()),
        name: name.to_string(),
        created_at: 1_700_000_000,
        updated_at: 1_700_000_000,
        status: "normal".to_string(),
    }
}

/// Enabled descriptor whose base is `https://<id>.example/v1`
pub fn app(id: &str) -> AppDescriptor {
    AppDescriptor {
        id: id.to_string(),
        request_config: crate::models::RequestConfig {
            api_base: format!("https://{}.example/v1", id),
            api_key: format!("key-{}", id),
        },
        info: Some(AppInfo {
            name: format!("App {}", id),
            mode: Some("chat".to_string()),
            description: String::new(),
            tags: vec![],
        }),
        is_enabled: Some(1),
    }
}
