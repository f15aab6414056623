//! Typed records for apps, conversations and backend responses
//!
//! Every shape crossing the boundary (catalog JSON, imported debug apps,
//! backend responses) is parsed into one of these records; malformed
//! input is rejected here rather than trusted downstream.

use serde::{Deserialize, Serialize};

pub mod app;
pub mod conversation;

pub use app::{
    AppDescriptor, AppInfo, AppParameters, AppSiteSettings, CurrentApp, FeatureToggle,
    FileUploadSettings, RequestConfig,
};
pub use conversation::{ConversationId, ConversationSummary, RemoteConversation, TEMP_ID_PREFIX};

/// Response of the file upload endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Backend file id, referenced when sending a message
    pub id: String,
    /// Original file name
    #[serde(default)]
    pub name: String,
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
    /// Extension as reported by the backend
    #[serde(default)]
    pub extension: String,
    /// MIME type as reported by the backend
    #[serde(default)]
    pub mime_type: String,
}

/// External link shown to internal user groups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    /// Label
    pub name: String,
    /// Target URL
    pub url: String,
}
