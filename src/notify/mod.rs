//! User-visible notifications.
//!
//! Errors caught at a query or mutation boundary end up here with a
//! contextual prefix, e.g. `Error restoring cache: <detail>`.

use tokio::sync::mpsc;

use crate::errors::ClientError;

/// Default prefix for failed reads.
pub const READ_ERROR_PREFIX: &str = "Error getting data";
/// Default prefix for failed writes.
pub const WRITE_ERROR_PREFIX: &str = "Error updating data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            Level::Info => tracing::info!("{}", notification.message),
            Level::Error => tracing::error!("{}", notification.message),
        }
    }
}

/// Forwards notifications to a channel, for a front-end to display.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("Notification receiver dropped");
        }
    }
}

/// Compose the message shown for an error: `{prefix}: {detail}`.
pub fn error_message(prefix: &str, error: &ClientError) -> String {
    format!("{}: {}", prefix, error.message())
}

/// Report an error caught at a query/mutation boundary.
pub fn report_error(notifier: &dyn Notifier, prefix: &str, error: &ClientError) {
    let message = error_message(prefix, error);
    tracing::error!("{} ({})", message, error.error_code());
    notifier.notify(Notification::error(message));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_server_detail() {
        let err = ClientError::Api {
            status: 409,
            detail: Some("Project is locked by another user".to_string()),
        };
        assert_eq!(
            error_message("Error restoring cache", &err),
            "Error restoring cache: Project is locked by another user"
        );
    }

    #[tokio::test]
    async fn test_channel_notifier() {
        let (notifier, mut rx) = ChannelNotifier::new();
        report_error(
            &notifier,
            READ_ERROR_PREFIX,
            &ClientError::Transport("connection refused".to_string()),
        );
        notifier.notify(Notification::info("Project is now open for editing"));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.level, Level::Error);
        assert_eq!(first.message, "Error getting data: connection refused");
        assert_eq!(rx.recv().await.unwrap().level, Level::Info);
    }
}
