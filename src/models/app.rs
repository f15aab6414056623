//! App descriptors and the remote configuration fetched for the active app

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{DifyChatError, Result};

/// Credentials used to talk to one app's backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestConfig {
    /// Base URL of the app's API (e.g. `https://api.dify.ai/v1`)
    pub api_base: String,
    /// App-scoped API key
    pub api_key: String,
}

impl RequestConfig {
    /// Reject configs that could never reach a backend
    pub fn validate(&self) -> Result<()> {
        if self.api_base.trim().is_empty() {
            return Err(DifyChatError::Validation("requestConfig.apiBase is empty".into()).into());
        }
        if self.api_key.trim().is_empty() {
            return Err(DifyChatError::Validation("requestConfig.apiKey is empty".into()).into());
        }
        Ok(())
    }
}

/// Basic app metadata returned by the backend's info endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    /// Display name
    pub name: String,
    /// Backend app mode (`chat`, `advanced-chat`, `agent-chat`, `workflow`, `completion`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// License tags; a user sees the app when their group is one of them
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AppInfo {
    /// Human-readable label for the app mode
    pub fn mode_label(&self) -> &'static str {
        match self.mode.as_deref() {
            Some("chat") => "Chatbot",
            Some("advanced-chat") => "Chatflow",
            Some("agent-chat") => "Agent",
            Some("workflow") => "Workflow",
            Some("completion") => "Text Generator",
            _ => "unknown",
        }
    }
}

/// One selectable bot configuration
///
/// `info` is only present once the descriptor has been validated against
/// its backend. `is_enabled == Some(0)` marks an app that exists but cannot
/// be used (license mismatch or failed validation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDescriptor {
    /// Stable identifier, also the gateway routing segment
    pub id: String,
    /// Backend credentials
    pub request_config: RequestConfig,
    /// Metadata resolved from the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<AppInfo>,
    /// `1` usable, `0` present but unusable, absent when never evaluated
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_enabled_flag"
    )]
    pub is_enabled: Option<u8>,
}

impl AppDescriptor {
    /// Build a descriptor from untrusted JSON, rejecting malformed shapes
    ///
    /// # Errors
    ///
    /// Returns [`DifyChatError::Validation`] when required fields are
    /// missing or empty.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let descriptor: AppDescriptor = serde_json::from_value(value)
            .map_err(|e| DifyChatError::Validation(format!("Malformed app descriptor: {}", e)))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Check the invariants a descriptor must hold once it has an id
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(DifyChatError::Validation("App descriptor has an empty id".into()).into());
        }
        self.request_config.validate()
    }

    /// Truthy `isEnabled`, the condition for the selectable list
    pub fn is_enabled(&self) -> bool {
        matches!(self.is_enabled, Some(v) if v != 0)
    }

    /// Explicitly disabled (`isEnabled === 0`), rendered greyed out
    pub fn is_disabled(&self) -> bool {
        self.is_enabled == Some(0)
    }

    /// Whether remote info has been resolved for this descriptor
    pub fn is_validated(&self) -> bool {
        self.info.is_some()
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        self.info
            .as_ref()
            .map(|i| i.name.as_str())
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.id)
    }

    /// Whether the license tags include the given group
    pub fn is_licensed_for(&self, group: &str) -> bool {
        self.info
            .as_ref()
            .map(|i| i.tags.iter().any(|t| t == group))
            .unwrap_or(false)
    }
}

/// Accepts `0`/`1` as well as `true`/`false` for `isEnabled`
fn deserialize_enabled_flag<'de, D>(deserializer: D) -> std::result::Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Number(u64),
        Bool(bool),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        None => None,
        Some(Flag::Number(n)) => Some(if n == 0 { 0 } else { 1 }),
        Some(Flag::Bool(b)) => Some(u8::from(b)),
    })
}

/// File upload settings of an app
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadSettings {
    /// Whether attachments are accepted at all
    #[serde(default)]
    pub enabled: bool,
    /// Allowed categories (`image`, `document`, `audio`, `video`, `custom`)
    #[serde(default)]
    pub allowed_file_types: Vec<String>,
    /// Allowed extensions as `.EXT`; empty means unrestricted
    #[serde(default)]
    pub allowed_file_extensions: Vec<String>,
    /// Maximum number of attachments per message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_limits: Option<u32>,
}

/// Toggle-style feature block (`{ "enabled": bool }`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggle {
    /// Whether the feature is on
    #[serde(default)]
    pub enabled: bool,
}

/// Behavioral parameters of an app
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppParameters {
    /// Greeting shown in an empty conversation
    #[serde(default)]
    pub opening_statement: String,
    /// Starter questions
    #[serde(default)]
    pub suggested_questions: Vec<String>,
    /// Attachment settings
    #[serde(default)]
    pub file_upload: FileUploadSettings,
    /// Speech-to-text availability
    #[serde(default)]
    pub speech_to_text: FeatureToggle,
    /// Text-to-speech availability
    #[serde(default)]
    pub text_to_speech: FeatureToggle,
    /// Input form definition, kept opaque
    #[serde(default)]
    pub user_input_form: Vec<serde_json::Value>,
}

/// Site presentation settings of an app
///
/// Older backends lack the endpoint; [`AppSiteSettings::default`] is the
/// documented substitute in that case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSiteSettings {
    /// Window title
    #[serde(default)]
    pub title: String,
    /// `emoji` or `image`
    #[serde(default = "default_icon_type")]
    pub icon_type: String,
    /// Emoji or file id, depending on `icon_type`
    #[serde(default)]
    pub icon: String,
    /// Icon background color
    #[serde(default)]
    pub icon_background: String,
    /// Absolute icon URL when `icon_type` is `image`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    /// Description text
    #[serde(default)]
    pub description: String,
    /// Default UI language
    #[serde(default = "default_language")]
    pub default_language: String,
    /// Whether workflow steps are displayed
    #[serde(default = "default_show_workflow_steps")]
    pub show_workflow_steps: bool,
}

fn default_icon_type() -> String {
    "emoji".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_show_workflow_steps() -> bool {
    true
}

impl Default for AppSiteSettings {
    fn default() -> Self {
        Self {
            title: String::new(),
            icon_type: default_icon_type(),
            icon: String::new(),
            icon_background: String::new(),
            icon_url: None,
            description: String::new(),
            default_language: default_language(),
            show_workflow_steps: default_show_workflow_steps(),
        }
    }
}

/// Fully loaded active app
///
/// Only ever built once both parameters and site settings are in hand, so
/// the pair always belongs to `config`.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentApp {
    /// Descriptor the app was loaded from
    pub config: AppDescriptor,
    /// Remote behavioral parameters
    pub parameters: AppParameters,
    /// Remote site settings (or the default substitute)
    pub site: AppSiteSettings,
}

impl CurrentApp {
    /// Id of the committed app
    pub fn id(&self) -> &str {
        &self.config.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_parses_camel_case() {
        let app = AppDescriptor::from_value(json!({
            "id": "a1",
            "requestConfig": { "apiBase": "https://x/v1", "apiKey": "app-1" },
            "info": { "name": "Helper", "tags": ["teamX"] },
            "isEnabled": 1
        }))
        .unwrap();

        assert_eq!(app.id, "a1");
        assert_eq!(app.request_config.api_base, "https://x/v1");
        assert!(app.is_enabled());
        assert!(app.is_licensed_for("teamX"));
        assert!(!app.is_licensed_for("teamY"));
    }

    #[test]
    fn test_descriptor_rejects_missing_request_config() {
        let err = AppDescriptor::from_value(json!({ "id": "a1" })).unwrap_err();
        assert!(err.to_string().contains("Malformed app descriptor"));
    }

    #[test]
    fn test_descriptor_rejects_empty_id() {
        let err = AppDescriptor::from_value(json!({
            "id": " ",
            "requestConfig": { "apiBase": "https://x/v1", "apiKey": "k" }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("empty id"));
    }

    #[test]
    fn test_enabled_flag_variants() {
        let base = json!({
            "id": "a",
            "requestConfig": { "apiBase": "b", "apiKey": "k" }
        });

        let absent = AppDescriptor::from_value(base.clone()).unwrap();
        assert!(!absent.is_enabled());
        assert!(!absent.is_disabled());

        let mut zero = base.clone();
        zero["isEnabled"] = json!(0);
        let zero = AppDescriptor::from_value(zero).unwrap();
        assert!(zero.is_disabled());
        assert!(!zero.is_enabled());

        let mut truthy = base;
        truthy["isEnabled"] = json!(true);
        assert!(AppDescriptor::from_value(truthy).unwrap().is_enabled());
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let app = AppDescriptor {
            id: "raw-id".into(),
            request_config: RequestConfig {
                api_base: "b".into(),
                api_key: "k".into(),
            },
            info: None,
            is_enabled: None,
        };
        assert_eq!(app.display_name(), "raw-id");
        assert!(!app.is_validated());
    }

    #[test]
    fn test_parameters_tolerate_missing_blocks() {
        let params: AppParameters = serde_json::from_value(json!({
            "opening_statement": "Hi",
            "file_upload": { "enabled": true, "allowed_file_extensions": [".PDF"] }
        }))
        .unwrap();
        assert!(params.file_upload.enabled);
        assert_eq!(params.file_upload.allowed_file_extensions, vec![".PDF"]);
        assert!(!params.speech_to_text.enabled);
    }

    #[test]
    fn test_site_settings_default() {
        let site = AppSiteSettings::default();
        assert_eq!(site.icon_type, "emoji");
        assert_eq!(site.default_language, "en-US");
        assert!(site.show_workflow_steps);
    }

    #[test]
    fn test_mode_label() {
        let info = AppInfo {
            mode: Some("advanced-chat".into()),
            ..Default::default()
        };
        assert_eq!(info.mode_label(), "Chatflow");
        assert_eq!(AppInfo::default().mode_label(), "unknown");
    }
}
