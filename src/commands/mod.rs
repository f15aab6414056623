//! Command handlers for DifyChat
//!
//! Each submodule drives one group of CLI commands against the library.
//! The helpers here open the local stores, perform the session check that
//! guards every command except `login`, `status` and `debug template`, and
//! print the notices the session components emit.

use std::sync::Arc;

use chrono::NaiveDate;
use colored::Colorize;
use tokio::sync::mpsc;

use crate::api::{HttpManifestSource, ManifestSource};
use crate::auth::{AuthService, PassphraseSumStrategy};
use crate::config::Config;
use crate::error::Result;
use crate::notify::{Notice, NoticeLevel, Notifier};
use crate::workspace::{Stores, Workspace};

pub mod apps;
pub mod auth;
pub mod conversations;
pub mod debug;
pub mod media;

/// Everything a command handler needs
pub struct CommandContext {
    /// Loaded configuration
    pub config: Config,
    /// Local stores
    pub stores: Stores,
    /// Whether `--debug` was given
    pub debug_signal: bool,
}

impl CommandContext {
    /// Open the stores named by the configuration
    ///
    /// # Errors
    ///
    /// Returns error if the local store cannot be opened
    pub fn open(config: Config, debug_signal: bool) -> Result<Self> {
        let stores = Stores::open(&config)?;
        Ok(Self {
            config,
            stores,
            debug_signal,
        })
    }

    /// Manifest source configured for this run
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn manifests(&self) -> Result<Arc<dyn ManifestSource>> {
        Ok(Arc::new(HttpManifestSource::new(
            &self.config.manifests.base_url,
            self.config.gateway.timeout_seconds,
        )?))
    }

    /// Login service backed by the passcode manifest
    ///
    /// # Errors
    ///
    /// Returns error if the manifest client cannot be built
    pub fn auth_service(&self) -> Result<AuthService> {
        let manifests = self.manifests()?;
        Ok(AuthService::new(
            Arc::new(PassphraseSumStrategy::new(manifests.clone())),
            manifests,
            self.stores.local.clone(),
            self.stores.session.clone(),
            self.config.session.expiry_hours,
            self.config.session.internal_groups.clone(),
        ))
    }

    /// Session check; returns the signed-in user id and group
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DifyChatError::AuthExpired`] when nobody is
    /// signed in or the login is too old
    pub fn require_session(&self) -> Result<(String, String)> {
        self.auth_service()?.require(today())
    }

    /// Workspace for the signed-in user plus the receiver of its notices
    ///
    /// # Errors
    ///
    /// Returns error if the session check fails or a client cannot be built
    pub fn workspace(&self) -> Result<(Workspace, mpsc::UnboundedReceiver<Notice>)> {
        let (user, _) = self.require_session()?;
        let (notifier, notices) = Notifier::channel();
        let workspace = Workspace::connect(
            &self.config,
            &user,
            self.stores.clone(),
            self.debug_signal,
            notifier,
        )?;
        Ok((workspace, notices))
    }
}

/// Today's date in local time
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Print every pending notice
pub fn print_notices(notices: &mut mpsc::UnboundedReceiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        println!("{}", render_notice(&notice));
    }
}

fn render_notice(notice: &Notice) -> String {
    match notice.level {
        NoticeLevel::Success => notice.message.green().to_string(),
        NoticeLevel::Info => notice.message.cyan().to_string(),
        NoticeLevel::Warning => notice.message.yellow().to_string(),
        NoticeLevel::Error => notice.message.red().to_string(),
    }
}
