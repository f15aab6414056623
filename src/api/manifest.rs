//! Static JSON manifests served next to the client

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::catalog::parse_descriptors;
use super::http::build_client;
use super::ManifestSource;
use crate::error::{DifyChatError, Result};
use crate::models::{AppDescriptor, ExternalLink};

const LICENSE_MANIFEST: &str = "app_config.json";
const PASSCODE_MANIFEST: &str = "user_config.json";
const LINK_MANIFEST: &str = "link_config.json";

/// License manifests are an array or a map keyed by app id
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LicenseBody {
    List(Vec<serde_json::Value>),
    Keyed(serde_json::Map<String, serde_json::Value>),
}

impl LicenseBody {
    fn into_entries(self) -> Vec<serde_json::Value> {
        match self {
            LicenseBody::List(entries) => entries,
            LicenseBody::Keyed(map) => map
                .into_iter()
                .map(|(id, mut entry)| {
                    if let Some(obj) = entry.as_object_mut() {
                        obj.entry("id").or_insert(serde_json::Value::String(id));
                    }
                    entry
                })
                .collect(),
        }
    }
}

/// Manifests fetched by relative path under one base URL
#[derive(Debug, Clone)]
pub struct HttpManifestSource {
    client: Client,
    base_url: String,
}

impl HttpManifestSource {
    /// Create a source rooted at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(base_url: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_seconds)?,
            base_url: base_url.into(),
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DifyChatError::Network(format!("Failed to fetch {}: {}", name, e)))?;
        if !response.status().is_success() {
            return Err(DifyChatError::Network(format!(
                "Failed to fetch {}: {}",
                name,
                response.status()
            ))
            .into());
        }
        let body = response
            .json::<T>()
            .await
            .map_err(|e| DifyChatError::Network(format!("Failed to parse {}: {}", name, e)))?;
        Ok(body)
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn license_manifest(&self) -> Result<Vec<AppDescriptor>> {
        let body: LicenseBody = self.fetch(LICENSE_MANIFEST).await?;
        Ok(parse_descriptors(body.into_entries()))
    }

    async fn passcode_manifest(&self) -> Result<Vec<(String, i64)>> {
        let body: serde_json::Map<String, serde_json::Value> =
            self.fetch(PASSCODE_MANIFEST).await?;
        Ok(parse_passcodes(body))
    }

    async fn links(&self) -> Result<Vec<ExternalLink>> {
        self.fetch(LINK_MANIFEST).await
    }
}

/// Group/passcode pairs in document order; non-integer codes are skipped
fn parse_passcodes(body: serde_json::Map<String, serde_json::Value>) -> Vec<(String, i64)> {
    body.into_iter()
        .filter_map(|(group, code)| match code.as_i64() {
            Some(code) => Some((group, code)),
            None => {
                tracing::warn!(group = %group, "Ignoring non-numeric passcode");
                None
            }
        })
        .collect()
}
