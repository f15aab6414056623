//! Conversation identity and summaries

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DifyChatError, Result};

/// Prefix of client-generated conversation ids
pub const TEMP_ID_PREFIX: &str = "temp_";

/// Identity of a conversation
///
/// A `Temporary` id exists only in local memory until the first message
/// exchange makes the backend create the conversation; a `Persisted` id is
/// assigned by the backend and used for every further server call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConversationId {
    /// Client-generated, not yet known to the backend
    Temporary(Uuid),
    /// Assigned by the backend
    Persisted(String),
}

impl ConversationId {
    /// Generate a fresh temporary id
    pub fn temporary() -> Self {
        ConversationId::Temporary(Uuid::new_v4())
    }

    /// Wrap a backend id, rejecting empty or temp-prefixed values
    pub fn persisted(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DifyChatError::Validation("Conversation id is empty".into()).into());
        }
        if id.starts_with(TEMP_ID_PREFIX) {
            return Err(DifyChatError::Validation(format!(
                "Backend conversation id uses the temporary prefix: {}",
                id
            ))
            .into());
        }
        Ok(ConversationId::Persisted(id))
    }

    /// Whether this id is client-generated
    pub fn is_temporary(&self) -> bool {
        matches!(self, ConversationId::Temporary(_))
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationId::Temporary(uuid) => write!(f, "{}{}", TEMP_ID_PREFIX, uuid),
            ConversationId::Persisted(id) => f.write_str(id),
        }
    }
}

impl FromStr for ConversationId {
    type Err = DifyChatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix(TEMP_ID_PREFIX) {
            let uuid = Uuid::parse_str(rest).map_err(|e| {
                DifyChatError::Validation(format!("Invalid temporary id {}: {}", s, e))
            })?;
            return Ok(ConversationId::Temporary(uuid));
        }
        if s.trim().is_empty() {
            return Err(DifyChatError::Validation("Conversation id is empty".into()));
        }
        Ok(ConversationId::Persisted(s.to_string()))
    }
}

impl TryFrom<String> for ConversationId {
    type Error = DifyChatError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConversationId> for String {
    fn from(id: ConversationId) -> Self {
        id.to_string()
    }
}

/// One entry of the conversation list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Identity (temporary or persisted)
    pub id: ConversationId,
    /// Display name
    pub name: String,
    /// Creation time, unix seconds
    pub created_at: i64,
    /// Last update time, unix seconds
    pub updated_at: i64,
    /// Backend status (`normal` for live conversations)
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "normal".to_string()
}

impl ConversationSummary {
    /// Create a provisional entry stamped with the current time
    pub fn provisional(name: impl Into<String>) -> Self {
        let now = Utc::now().timestamp();
        Self {
            id: ConversationId::temporary(),
            name: name.into(),
            created_at: now,
            updated_at: now,
            status: default_status(),
        }
    }

    /// Whether this entry only exists locally
    pub fn is_temporary(&self) -> bool {
        self.id.is_temporary()
    }
}

/// Conversation record as returned by the backend list endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConversation {
    /// Backend id
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Creation time, unix seconds
    #[serde(default)]
    pub created_at: i64,
    /// Last update time, unix seconds
    #[serde(default)]
    pub updated_at: i64,
    /// Backend status
    #[serde(default = "default_status")]
    pub status: String,
}

impl TryFrom<RemoteConversation> for ConversationSummary {
    type Error = anyhow::Error;

    fn try_from(remote: RemoteConversation) -> Result<Self> {
        Ok(Self {
            id: ConversationId::persisted(remote.id)?,
            name: remote.name,
            created_at: remote.created_at,
            updated_at: remote.updated_at,
            status: remote.status,
        })
    }
}
