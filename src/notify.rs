//! User-visible notices (the client's equivalent of toast messages).

use tokio::sync::mpsc;
use tracing::{info, warn};

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
}

/// A message meant for the person using the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Sends notices to whoever renders them. Every notice is logged as well.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<mpsc::UnboundedSender<Notice>>,
}

impl Notifier {
    /// Create a notifier and the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A notifier that only logs.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.send(NoticeLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.send(NoticeLevel::Warning, message);
    }

    fn send(&self, level: NoticeLevel, message: String) {
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is rendering notices any more.
            let _ = tx.send(Notice { level, message });
        }
    }
}
