use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use difychat::storage::MemoryStore;
use difychat::workspace::Stores;
use difychat::Config;
use serde_json::{json, Value};
use tempfile::TempDir;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn memory_stores() -> Stores {
    Stores {
        local: Arc::new(MemoryStore::new()),
        session: Arc::new(MemoryStore::new()),
    }
}

/// Configuration pointing every endpoint at one mock server
#[allow(dead_code)]
pub fn config_for(server_uri: &str) -> Config {
    let mut config = Config::default();
    config.gateway.base_url = format!("{}/gw", server_uri);
    config.gateway.timeout_seconds = 5;
    config.catalog.url = format!("{}/apps", server_uri);
    config.manifests.base_url = format!("{}/static", server_uri);
    config
}

#[allow(dead_code)]
pub fn descriptor(id: &str, enabled: u8) -> Value {
    json!({
        "id": id,
        "requestConfig": {
            "apiBase": format!("https://{}.example/v1", id),
            "apiKey": format!("key-{}", id),
        },
        "info": { "name": format!("App {}", id), "mode": "chat", "tags": ["ADM"] },
        "isEnabled": enabled,
    })
}
