//! `reqwest` implementation of the backend API

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;

use super::{ApiFactory, ConversationApi, FilePayload, RequestOptions};
use crate::error::{DifyChatError, Result};
use crate::models::{
    AppInfo, AppParameters, AppSiteSettings, ConversationSummary, RemoteConversation,
    UploadedFile,
};

/// Page returned by the conversation list endpoint
#[derive(Debug, Deserialize)]
struct ConversationPage {
    #[serde(default)]
    data: Vec<RemoteConversation>,
    #[serde(default)]
    has_more: bool,
}

/// Body of the speech-to-text endpoint
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Backend client reconfigured in place on every app switch
///
/// # Examples
///
/// ```
/// use difychat::api::{ConversationApi, HttpConversationApi, RequestOptions};
///
/// let api = HttpConversationApi::new(30, 100).unwrap();
/// api.update_options(RequestOptions {
///     user: "me@example.com".into(),
///     api_base: "https://api.dify.ai/v1".into(),
///     api_key: "app-key".into(),
/// });
/// assert_eq!(api.options().api_base, "https://api.dify.ai/v1");
/// ```
pub struct HttpConversationApi {
    client: Client,
    options: RwLock<RequestOptions>,
    list_limit: u32,
}

impl HttpConversationApi {
    /// Create a client with empty options
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(timeout_seconds: u64, list_limit: u32) -> Result<Self> {
        Ok(Self::with_client(
            build_client(timeout_seconds)?,
            RequestOptions::default(),
            list_limit,
        ))
    }

    /// Create a client sharing an existing connection pool
    pub fn with_client(client: Client, options: RequestOptions, list_limit: u32) -> Self {
        Self {
            client,
            options: RwLock::new(options),
            list_limit,
        }
    }

    fn url(options: &RequestOptions, path: &str) -> String {
        format!("{}/{}", options.api_base.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: RequestBuilder, options: &RequestOptions) -> RequestBuilder {
        builder.bearer_auth(&options.api_key)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let options = self.options();
        let request = self
            .client
            .get(Self::url(&options, path))
            .query(&[("user", options.user.as_str())]);
        let response = self.authorized(request, &options).send().await.map_err(|e| {
            DifyChatError::Network(format!("GET /{} failed: {}", path, e))
        })?;
        let response = check_status(response, "GET", path).await?;
        let body = response.json::<T>().await.map_err(|e| {
            DifyChatError::Network(format!("GET /{} returned an unexpected body: {}", path, e))
        })?;
        Ok(body)
    }
}

pub(crate) fn build_client(timeout_seconds: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(concat!("difychat/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| DifyChatError::Config(format!("Failed to create HTTP client: {}", e)).into())
}

async fn check_status(response: Response, method: &str, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DifyChatError::Network(format!("{} /{} returned {}: {}", method, path, status, body)).into())
}

#[async_trait]
impl ConversationApi for HttpConversationApi {
    fn update_options(&self, options: RequestOptions) {
        tracing::debug!(api_base = %options.api_base, "Updating backend request options");
        let mut guard = self.options.write().unwrap_or_else(|p| p.into_inner());
        *guard = options;
    }

    fn options(&self) -> RequestOptions {
        self.options
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    async fn get_app_info(&self) -> Result<AppInfo> {
        self.get_json("info").await
    }

    async fn get_app_parameters(&self) -> Result<AppParameters> {
        self.get_json("parameters").await
    }

    async fn get_app_site_setting(&self) -> Result<AppSiteSettings> {
        self.get_json("site").await
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let options = self.options();
        let limit = self.list_limit.to_string();
        let request = self
            .client
            .get(Self::url(&options, "conversations"))
            .query(&[("user", options.user.as_str()), ("limit", limit.as_str())]);
        let response = self
            .authorized(request, &options)
            .send()
            .await
            .map_err(|e| DifyChatError::Network(format!("GET /conversations failed: {}", e)))?;
        let page: ConversationPage = check_status(response, "GET", "conversations")
            .await?
            .json()
            .await
            .map_err(|e| {
                DifyChatError::Network(format!("Unexpected conversation list body: {}", e))
            })?;

        if page.has_more {
            tracing::debug!(limit = self.list_limit, "Conversation list truncated");
        }

        page.data
            .into_iter()
            .map(ConversationSummary::try_from)
            .collect()
    }

    async fn rename_conversation(&self, conversation_id: &str, name: &str) -> Result<()> {
        let options = self.options();
        let path = format!("conversations/{}/name", conversation_id);
        let request = self.client.post(Self::url(&options, &path)).json(&json!({
            "name": name,
            "auto_generate": false,
            "user": options.user,
        }));
        let response = self
            .authorized(request, &options)
            .send()
            .await
            .map_err(|e| DifyChatError::Network(format!("POST /{} failed: {}", path, e)))?;
        check_status(response, "POST", &path).await?;
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let options = self.options();
        let path = format!("conversations/{}", conversation_id);
        let request = self
            .client
            .delete(Self::url(&options, &path))
            .json(&json!({ "user": options.user }));
        let response = self
            .authorized(request, &options)
            .send()
            .await
            .map_err(|e| DifyChatError::Network(format!("DELETE /{} failed: {}", path, e)))?;
        check_status(response, "DELETE", &path).await?;
        Ok(())
    }

    async fn upload_file(&self, file: FilePayload) -> Result<UploadedFile> {
        let options = self.options();
        let mut part = multipart::Part::bytes(file.bytes).file_name(file.name.clone());
        if let Some(mime) = &file.mime_type {
            part = part
                .mime_str(mime)
                .map_err(|e| DifyChatError::Validation(format!("Invalid MIME type: {}", e)))?;
        }
        let form = multipart::Form::new()
            .part("file", part)
            .text("user", options.user.clone());
        let request = self
            .client
            .post(Self::url(&options, "files/upload"))
            .multipart(form);
        let response = self
            .authorized(request, &options)
            .send()
            .await
            .map_err(|e| DifyChatError::Network(format!("Upload of {} failed: {}", file.name, e)))?;
        let uploaded = check_status(response, "POST", "files/upload")
            .await?
            .json()
            .await
            .map_err(|e| DifyChatError::Network(format!("Unexpected upload body: {}", e)))?;
        Ok(uploaded)
    }

    async fn audio_to_text(&self, audio: Vec<u8>) -> Result<String> {
        let options = self.options();
        let part = multipart::Part::bytes(audio)
            .file_name("audio.webm")
            .mime_str("audio/webm")
            .map_err(|e| DifyChatError::Validation(format!("Invalid MIME type: {}", e)))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("user", options.user.clone());
        let request = self
            .client
            .post(Self::url(&options, "audio-to-text"))
            .multipart(form);
        let response = self
            .authorized(request, &options)
            .send()
            .await
            .map_err(|e| DifyChatError::Network(format!("Speech-to-text failed: {}", e)))?;
        let body: TranscriptionResponse = check_status(response, "POST", "audio-to-text")
            .await?
            .json()
            .await
            .map_err(|e| DifyChatError::Network(format!("Unexpected transcription body: {}", e)))?;
        Ok(body.text)
    }
}

/// Factory producing standalone clients that share one connection pool
#[derive(Debug, Clone)]
pub struct HttpApiFactory {
    client: Client,
    list_limit: u32,
}

impl HttpApiFactory {
    /// Create a factory
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(timeout_seconds: u64, list_limit: u32) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_seconds)?,
            list_limit,
        })
    }
}

impl ApiFactory for HttpApiFactory {
    fn create(&self, options: RequestOptions) -> Arc<dyn ConversationApi> {
        Arc::new(HttpConversationApi::with_client(
            self.client.clone(),
            options,
            self.list_limit,
        ))
    }
}
