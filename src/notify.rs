//! User-facing notifications
//!
//! Recoverable failures are surfaced as transient notices instead of
//! errors that unwind the session. The front end owns the receiving half
//! of the channel and decides how to render them.

use tokio::sync::mpsc;

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Operation completed
    Success,
    /// Informational
    Info,
    /// Degraded but continuing
    Warning,
    /// Operation failed
    Error,
}

/// One transient user notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity
    pub level: NoticeLevel,
    /// Message shown to the user
    pub message: String,
}

/// Cloneable sender of notices
///
/// Every notice is also logged through `tracing`, so a notifier without a
/// receiver still leaves a trail.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<mpsc::UnboundedSender<Notice>>,
}

impl Notifier {
    /// Create a notifier and the receiver the front end drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Notifier that only logs
    pub fn silent() -> Self {
        Self { tx: None }
    }

    /// Emit a success notice
    pub fn success(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Success, message.into());
    }

    /// Emit an informational notice
    pub fn info(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Info, message.into());
    }

    /// Emit a warning notice
    pub fn warning(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Warning, message.into());
    }

    /// Emit an error notice
    pub fn error(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Error, message.into());
    }

    fn emit(&self, level: NoticeLevel, message: String) {
        match level {
            NoticeLevel::Error => tracing::error!("{}", message),
            NoticeLevel::Warning => tracing::warn!("{}", message),
            _ => tracing::info!("{}", message),
        }
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is rendering; the log line is enough.
            let _ = tx.send(Notice { level, message });
        }
    }
}
