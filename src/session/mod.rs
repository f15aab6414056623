//! Process-wide session flags
//!
//! Debug mode can be switched on three ways: a configuration flag that
//! pins it for every launch, a one-time launch signal, or a session flag a
//! previous launch in the same login session already persisted.
//! [`SessionConfig::init`] is the only place these sources are read; the
//! resulting value is threaded explicitly through the catalog resolver and
//! the override store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::storage::{KeyValueStore, StorageKey};

pub mod latest;

pub use latest::LatestValue;

const FLAG_ON: &str = "true";

/// Resolved debug-mode flags for this process
pub struct SessionConfig {
    always_debug: bool,
    signal_debug: bool,
    debug: AtomicBool,
    session_store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("always_debug", &self.always_debug)
            .field("signal_debug", &self.signal_debug)
            .field("debug", &self.is_debug_mode())
            .finish()
    }
}

impl SessionConfig {
    /// Read the persisted flags once and record the launch signal
    ///
    /// # Arguments
    ///
    /// * `always_debug` - configuration flag pinning debug mode on
    /// * `debug_signal` - one-time signal given on this launch
    /// * `session_store` - session-scoped store holding the sticky flag
    ///
    /// # Errors
    ///
    /// Returns an error if the session store cannot be read or written.
    pub fn init(
        always_debug: bool,
        debug_signal: bool,
        session_store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        if debug_signal {
            session_store.set(StorageKey::DebugMode, FLAG_ON)?;
        }
        let sticky = session_store.get(StorageKey::DebugMode)?.as_deref() == Some(FLAG_ON);
        let debug_on = always_debug || debug_signal || sticky;

        tracing::debug!(
            always_debug,
            debug_signal,
            sticky,
            debug = debug_on,
            "Session flags resolved"
        );

        Ok(Self {
            always_debug,
            signal_debug: debug_signal,
            debug: AtomicBool::new(debug_on),
            session_store,
        })
    }

    /// Whether debug-mode app resolution is active
    pub fn is_debug_mode(&self) -> bool {
        self.debug.load(Ordering::SeqCst)
    }

    /// Whether debug mode is pinned by configuration and cannot be left
    pub fn is_always_debug(&self) -> bool {
        self.always_debug
    }

    /// Whether the debug-app editor should be offered on this launch
    pub fn debug_editor_visible(&self) -> bool {
        self.is_debug_mode() && self.signal_debug
    }

    /// Leave debug mode for the rest of the session
    ///
    /// When debug mode is pinned by configuration the sticky flag is still
    /// cleared but the mode stays on.
    pub fn clear_debug(&self) -> Result<()> {
        self.session_store.remove(StorageKey::DebugMode)?;
        self.debug.store(self.always_debug, Ordering::SeqCst);
        tracing::info!(debug = self.always_debug, "Debug session flag cleared");
        Ok(())
    }
}
