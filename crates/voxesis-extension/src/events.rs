//! User-facing notifications raised by the extension system.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title of the notification raised for each extension that fails to load.
pub const ITEM_FAILURE_TITLE: &str = "extension failed to load";
/// Title of the notification raised when the whole load is rejected.
pub const FATAL_FAILURE_TITLE: &str = "extension system error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A non-blocking message for the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub level: NotificationLevel,
    /// The extension the message is about, when there is one.
    pub extension: Option<String>,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            level,
            extension: None,
            at: Utc::now(),
        }
    }

    pub fn for_extension(mut self, name: impl Into<String>) -> Self {
        self.extension = Some(name.into());
        self
    }
}

/// Receives notifications. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        let extension = n.extension.as_deref().unwrap_or("-");
        match n.level {
            NotificationLevel::Info => {
                tracing::info!(extension = %extension, title = %n.title, "{}", n.message)
            }
            NotificationLevel::Warning => {
                tracing::warn!(extension = %extension, title = %n.title, "{}", n.message)
            }
            NotificationLevel::Error => {
                tracing::error!(extension = %extension, title = %n.title, "{}", n.message)
            }
        }
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct NotificationLog {
    entries: Mutex<Vec<Notification>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Notification> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for NotificationLog {
    fn notify(&self, notification: Notification) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(notification);
        }
    }
}
