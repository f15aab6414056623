//! Configuration management for DifyChat
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::catalog::ValidationStrategy;
use crate::error::{DifyChatError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for DifyChat
///
/// Every section has defaults, so an empty file (or no file at all) yields
/// a usable configuration for a local gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Shared gateway the per-app requests are routed through
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Remote app catalog
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Static JSON manifests
    #[serde(default)]
    pub manifests: ManifestConfig,
    /// Debug-mode settings
    #[serde(default)]
    pub debug: DebugConfig,
    /// Login session settings
    #[serde(default)]
    pub session: SessionSettings,
    /// Conversation list settings
    #[serde(default)]
    pub conversations: ConversationSettings,
    /// Upload settings
    #[serde(default)]
    pub uploads: UploadSettings,
    /// Local storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL; a catalog app's requests go to `{base_url}/{app_id}`
    #[serde(default = "default_gateway_url")]
    pub base_url: String,

    /// Timeout for every HTTP request (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_gateway_url() -> String {
    "http://localhost:8080/dify-chat/api".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// Remote app catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Catalog endpoint returning the app descriptors
    #[serde(default = "default_catalog_url")]
    pub url: String,

    /// How catalog entries are judged usable
    #[serde(default)]
    pub validation: ValidationStrategy,
}

fn default_catalog_url() -> String {
    "http://localhost:8080/dify-chat/api/apps".to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            validation: ValidationStrategy::default(),
        }
    }
}

/// Static manifest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Directory URL holding `app_config.json`, `user_config.json` and
    /// `link_config.json`
    #[serde(default = "default_manifest_url")]
    pub base_url: String,
}

fn default_manifest_url() -> String {
    "http://localhost:8080/dify-chat".to_string()
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            base_url: default_manifest_url(),
        }
    }
}

/// Debug-mode configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Pin debug mode on for every launch
    #[serde(default)]
    pub always: bool,
}

/// Login session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Hours between the login day's midnight and today's midnight after
    /// which the login expires
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: i64,

    /// Groups that see the external links
    #[serde(default = "default_internal_groups")]
    pub internal_groups: Vec<String>,
}

fn default_expiry_hours() -> i64 {
    24
}

fn default_internal_groups() -> Vec<String> {
    vec!["ADM".to_string()]
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            expiry_hours: default_expiry_hours(),
            internal_groups: default_internal_groups(),
        }
    }
}

/// Conversation list configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSettings {
    /// Name given to provisional conversations
    #[serde(default = "default_conversation_name")]
    pub default_name: String,

    /// Page size of the conversation list request
    #[serde(default = "default_list_limit")]
    pub list_limit: u32,
}

fn default_conversation_name() -> String {
    "New conversation".to_string()
}

fn default_list_limit() -> u32 {
    100
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            default_name: default_conversation_name(),
            list_limit: default_list_limit(),
        }
    }
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Interval between simulated progress steps (milliseconds)
    #[serde(default = "default_progress_tick")]
    pub progress_tick_ms: u64,
}

fn default_progress_tick() -> u64 {
    100
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            progress_tick_ms: default_progress_tick(),
        }
    }
}

/// Local storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the sled database; platform data dir when unset
    #[serde(default)]
    pub path: Option<String>,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DifyChatError::Config(format!("Failed to read config file: {}", e)))?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents)
            .map_err(|e| DifyChatError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("DIFYCHAT_GATEWAY_URL") {
            self.gateway.base_url = url;
        }

        if let Ok(timeout) = std::env::var("DIFYCHAT_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.gateway.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid DIFYCHAT_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(url) = std::env::var("DIFYCHAT_CATALOG_URL") {
            self.catalog.url = url;
        }

        if let Ok(strategy) = std::env::var("DIFYCHAT_CATALOG_VALIDATION") {
            self.catalog.validation = match strategy.to_lowercase().as_str() {
                "enabled_flag" => ValidationStrategy::EnabledFlag,
                "full" => ValidationStrategy::Full,
                _ => {
                    tracing::warn!("Invalid catalog validation: {}, using default", strategy);
                    ValidationStrategy::default()
                }
            };
        }

        if let Ok(url) = std::env::var("DIFYCHAT_MANIFEST_URL") {
            self.manifests.base_url = url;
        }

        if let Ok(always) = std::env::var("DIFYCHAT_DEBUG_MODE") {
            match always.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.debug.always = true,
                "false" | "0" | "no" => self.debug.always = false,
                _ => tracing::warn!("Invalid DIFYCHAT_DEBUG_MODE: {}", always),
            }
        }

        if let Ok(hours) = std::env::var("DIFYCHAT_SESSION_EXPIRY_HOURS") {
            if let Ok(value) = hours.parse() {
                self.session.expiry_hours = value;
            } else {
                tracing::warn!("Invalid DIFYCHAT_SESSION_EXPIRY_HOURS: {}", hours);
            }
        }

        if let Ok(groups) = std::env::var("DIFYCHAT_INTERNAL_GROUPS") {
            self.session.internal_groups = groups
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(path) = std::env::var("DIFYCHAT_STORE_PATH") {
            self.storage.path = Some(path);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(path) = &cli.storage_path {
            self.storage.path = Some(path.clone());
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// Ensures URLs parse and that numeric settings are within acceptable
    /// ranges.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        check_url("gateway.base_url", &self.gateway.base_url)?;
        check_url("catalog.url", &self.catalog.url)?;
        check_url("manifests.base_url", &self.manifests.base_url)?;

        if self.gateway.timeout_seconds == 0 {
            return Err(DifyChatError::Config(
                "gateway.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.session.expiry_hours <= 0 {
            return Err(DifyChatError::Config(
                "session.expiry_hours must be greater than 0".to_string(),
            )
            .into());
        }

        if self.conversations.default_name.trim().is_empty() {
            return Err(DifyChatError::Config(
                "conversations.default_name cannot be empty".to_string(),
            )
            .into());
        }

        if self.conversations.list_limit == 0 || self.conversations.list_limit > 100 {
            return Err(DifyChatError::Config(
                "conversations.list_limit must be between 1 and 100".to_string(),
            )
            .into());
        }

        if self.uploads.progress_tick_ms == 0 {
            return Err(DifyChatError::Config(
                "uploads.progress_tick_ms must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

fn check_url(field: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| DifyChatError::Config(format!("{} is not a valid URL: {}", field, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(DifyChatError::Config(format!(
            "{} must use http or https, got {}",
            field, other
        ))
        .into()),
    }
}
