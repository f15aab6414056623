//! Remote app catalog over HTTP

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::http::build_client;
use super::AppCatalog;
use crate::error::{DifyChatError, Result};
use crate::models::AppDescriptor;

/// Catalog bodies come either as a bare array or wrapped in a page
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogBody {
    List(Vec<serde_json::Value>),
    Page { data: Vec<serde_json::Value> },
}

impl CatalogBody {
    fn into_entries(self) -> Vec<serde_json::Value> {
        match self {
            CatalogBody::List(entries) => entries,
            CatalogBody::Page { data } => data,
        }
    }
}

/// Catalog endpoint returning the canonical app list
#[derive(Debug, Clone)]
pub struct HttpAppCatalog {
    client: Client,
    url: String,
}

impl HttpAppCatalog {
    /// Create a catalog client for `url`
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(url: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_seconds)?,
            url: url.into(),
        })
    }
}

/// Parse catalog entries, dropping the malformed ones
pub(crate) fn parse_descriptors(entries: Vec<serde_json::Value>) -> Vec<AppDescriptor> {
    entries
        .into_iter()
        .filter_map(|entry| match AppDescriptor::from_value(entry) {
            Ok(app) => Some(app),
            Err(e) => {
                tracing::warn!("Skipping catalog entry: {}", e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl AppCatalog for HttpAppCatalog {
    async fn fetch_apps(&self) -> Result<Vec<AppDescriptor>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| DifyChatError::Network(format!("Catalog request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DifyChatError::Network(format!("Catalog returned {}", status)).into());
        }

        let body: CatalogBody = response
            .json()
            .await
            .map_err(|e| DifyChatError::Network(format!("Unexpected catalog body: {}", e)))?;

        let apps = parse_descriptors(body.into_entries());
        tracing::debug!(count = apps.len(), "Fetched app catalog");
        Ok(apps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalog_body_accepts_both_shapes() {
        let list: CatalogBody = serde_json::from_value(json!([{ "id": "a" }])).unwrap();
        assert_eq!(list.into_entries().len(), 1);

        let page: CatalogBody =
            serde_json::from_value(json!({ "data": [{ "id": "a" }, { "id": "b" }] })).unwrap();
        assert_eq!(page.into_entries().len(), 2);
    }

    #[test]
    fn test_parse_descriptors_drops_malformed_entries() {
        let apps = parse_descriptors(vec![
            json!({ "id": "ok", "requestConfig": { "apiBase": "b", "apiKey": "k" }, "isEnabled": 1 }),
            json!({ "id": "broken" }),
        ]);
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].id, "ok");
    }
}
