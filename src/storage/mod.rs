//! Local key-value persistence
//!
//! The session layer only needs a tiny synchronous string store: identity
//! keys written at login, the debug-mode flag and the imported debug apps.
//! [`KeyValueStore`] abstracts over the backing store so the business
//! logic can run against [`MemoryStore`] in tests and [`SledStore`] in the
//! binary.

use crate::error::Result;

pub mod memory;
pub mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

/// Well-known keys in the local stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Identifier of the logged-in user (their email)
    UserId,
    /// Group label resolved at login, used for license filtering
    UserGroup,
    /// Login date as `YYYY-MM-DD`
    LoginDate,
    /// Session-scoped debug flag
    DebugMode,
    /// JSON blob of imported debug apps
    DebugApps,
}

impl StorageKey {
    /// Key name as written to the store
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::UserId => "USER_ID",
            StorageKey::UserGroup => "USER_GROUP",
            StorageKey::LoginDate => "LOGIN_DATE",
            StorageKey::DebugMode => "__DC__DEBUG_MODE",
            StorageKey::DebugApps => "__DC__DEBUG_APPS",
        }
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronous, local, durable string store
///
/// Implementations must be cheap to call from async code; none of the
/// methods may block on the network.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key is absent
    fn get(&self, key: StorageKey) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&self, key: StorageKey, value: &str) -> Result<()>;

    /// Remove a key; removing an absent key is not an error
    fn remove(&self, key: StorageKey) -> Result<()>;

    /// Remove every key held by this store
    fn clear(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_names() {
        assert_eq!(StorageKey::UserId.as_str(), "USER_ID");
        assert_eq!(StorageKey::UserGroup.as_str(), "USER_GROUP");
        assert_eq!(StorageKey::LoginDate.as_str(), "LOGIN_DATE");
        assert_eq!(StorageKey::DebugMode.to_string(), "__DC__DEBUG_MODE");
        assert_eq!(StorageKey::DebugApps.to_string(), "__DC__DEBUG_APPS");
    }
}
