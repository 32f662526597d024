//! User-facing notifications (the terminal equivalent of toasts).
//!
//! Components push [`Notification`]s through a cloneable [`Notifier`]; the
//! front end drains the receiving side. Sending never blocks and never
//! fails: with no receiver the notification is only logged.

use std::fmt;

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Info => write!(f, "info"),
            Level::Success => write!(f, "success"),
            Level::Warning => write!(f, "warning"),
            Level::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<mpsc::UnboundedSender<Notification>>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Log-only notifier.
    pub fn silent() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, level: Level, title: impl Into<String>, body: impl Into<String>) {
        let notification = Notification {
            level,
            title: title.into(),
            body: body.into(),
        };
        match level {
            Level::Error => tracing::error!(title = %notification.title, "{}", notification.body),
            Level::Warning => tracing::warn!(title = %notification.title, "{}", notification.body),
            Level::Info | Level::Success => {
                tracing::info!(title = %notification.title, "{}", notification.body)
            }
        }
        if let Some(tx) = &self.tx {
            // Receiver gone means the front end is shutting down.
            let _ = tx.send(notification);
        }
    }

    pub fn info(&self, title: impl Into<String>, body: impl Into<String>) {
        self.send(Level::Info, title, body);
    }

    pub fn success(&self, title: impl Into<String>, body: impl Into<String>) {
        self.send(Level::Success, title, body);
    }

    pub fn warning(&self, title: impl Into<String>, body: impl Into<String>) {
        self.send(Level::Warning, title, body);
    }

    pub fn error(&self, title: impl Into<String>, body: impl Into<String>) {
        self.send(Level::Error, title, body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_reach_receiver_in_order() {
        let (notifier, mut rx) = Notifier::channel();
        notifier.info("Regeneration started", "Regenerating 2 characters");
        notifier.clone().error("Regeneration failed", "timed out");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.level, Level::Info);
        assert_eq!(first.title, "Regeneration started");
        let second = rx.try_recv().unwrap();
        assert_eq!(second.level, Level::Error);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn silent_and_dropped_receivers_do_not_panic() {
        Notifier::silent().warning("Font loading issue", "weight 500");
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        notifier.success("done", "");
    }

    #[test]
    fn level_display() {
        assert_eq!(Level::Warning.to_string(), "warning");
    }
}
