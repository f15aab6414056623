//! DifyChat - multi-app chat client library
//!
//! This library provides the session core of a chat client that fronts
//! several Dify apps: resolving which apps a user may use, switching the
//! active app, and managing each app's conversation list.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `overrides`: debug-mode app import and license filtering
//! - `catalog`: merges the remote catalog with debug overrides
//! - `app_session`: active-app selection and atomic commits
//! - `conversations`: conversation list lifecycle
//! - `uploads`: attachment uploads and speech-to-text
//! - `auth`: login, expiry and logout
//! - `api`: collaborator traits and their HTTP implementations
//! - `workspace`: wires the components for one signed-in user
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use difychat::notify::Notifier;
//! use difychat::workspace::{Stores, Workspace};
//! use difychat::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let stores = Stores::open(&config)?;
//!     let (notifier, _notices) = Notifier::channel();
//!     let workspace = Workspace::connect(&config, "me@example.com", stores, false, notifier)?;
//!     workspace.open_app(None, false).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod app_session;
pub mod auth;
pub mod catalog;
pub mod cli;
pub mod commands;
pub mod config;
pub mod conversations;
pub mod error;
pub mod models;
pub mod notify;
pub mod overrides;
pub mod session;
pub mod storage;
pub mod uploads;
pub mod workspace;

// Re-export commonly used types
pub use app_session::{AppSessionController, AppState};
pub use config::Config;
pub use conversations::ConversationStore;
pub use error::{DifyChatError, Result};
pub use workspace::Workspace;
