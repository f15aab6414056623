use std::path::PathBuf;

use anyhow::Context;
use directories::ProjectDirs;

use super::{KeyValueStore, StorageKey};
use crate::error::{DifyChatError, Result};

const LOCAL_TREE: &str = "local";
const SESSION_TREE: &str = "session";

/// Key-value store backed by one `sled` tree
#[derive(Debug, Clone)]
pub struct SledStore {
    tree: sled::Tree,
}

/// The two scopes the client persists into
///
/// `local` survives restarts; `session` holds flags that only live for a
/// login session and is wiped on logout or expiry.
#[derive(Debug, Clone)]
pub struct StoreScopes {
    /// Durable scope (identity keys, debug apps)
    pub local: SledStore,
    /// Session scope (debug flag)
    pub session: SledStore,
}

impl SledStore {
    /// Open both scopes in the user's data directory
    ///
    /// `DIFYCHAT_STORE_PATH` overrides the location, which makes it easy to
    /// point the binary at a throwaway database.
    pub fn open_default() -> Result<StoreScopes> {
        if let Ok(override_path) = std::env::var("DIFYCHAT_STORE_PATH") {
            return Self::open_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "difychat", "difychat")
            .ok_or_else(|| DifyChatError::Storage("Could not determine data directory".into()))?;

        Self::open_with_path(proj_dirs.data_dir().join("store"))
    }

    /// Open both scopes in a database at the given path
    pub fn open_with_path<P: Into<PathBuf>>(path: P) -> Result<StoreScopes> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for store")
                .map_err(|e| DifyChatError::Storage(e.to_string()))?;
        }

        let db = sled::open(&path)
            .with_context(|| format!("Failed to open store at {}", path.display()))
            .map_err(|e| DifyChatError::Storage(e.to_string()))?;

        tracing::debug!(path = %path.display(), "Opened local store");
        Self::scopes(&db)
    }

    /// Open both scopes in a temporary database removed on drop
    pub fn temporary() -> Result<StoreScopes> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::scopes(&db)
    }

    fn scopes(db: &sled::Db) -> Result<StoreScopes> {
        Ok(StoreScopes {
            local: SledStore {
                tree: db.open_tree(LOCAL_TREE)?,
            },
            session: SledStore {
                tree: db.open_tree(SESSION_TREE)?,
            },
        })
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>> {
        match self.tree.get(key.as_str())? {
            Some(raw) => {
                let value = String::from_utf8(raw.to_vec()).map_err(|e| {
                    DifyChatError::Storage(format!("Value for {} is not UTF-8: {}", key, e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<()> {
        self.tree.insert(key.as_str(), value.as_bytes())?;
        self.tree.flush()?;
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<()> {
        self.tree.remove(key.as_str())?;
        self.tree.flush()?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.tree.clear()?;
        self.tree.flush()?;
        Ok(())
    }
}
