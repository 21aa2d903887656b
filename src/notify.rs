use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationVariant {
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: NotificationVariant,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NotificationVariant::Default,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NotificationVariant::Destructive,
        }
    }
}

/// Fan-out of user-facing notifications to whatever UI is attached.
///
/// Notifications sent with [`NotificationHub::emit_or_hold`] while nobody is
/// listening are kept and handed to the next subscriber.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
    held: Arc<Mutex<Vec<Notification>>>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            held: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        let receiver = self.sender.subscribe();
        let held = match self.held.lock() {
            Ok(mut held) => std::mem::take(&mut *held),
            Err(_) => {
                tracing::warn!("held notification queue poisoned; dropping held notifications");
                Vec::new()
            }
        };
        for notification in held {
            let _ = self.sender.send(notification);
        }
        receiver
    }

    pub fn emit(&self, notification: Notification) {
        tracing::info!(
            title = %notification.title,
            variant = ?notification.variant,
            "notification"
        );
        // No subscriber is fine; the UI may not be attached yet.
        let _ = self.sender.send(notification);
    }

    /// Like [`emit`](Self::emit), but a notification nobody can receive yet
    /// waits for the next subscriber instead of being lost.
    pub fn emit_or_hold(&self, notification: Notification) {
        if self.sender.receiver_count() > 0 {
            self.emit(notification);
            return;
        }
        tracing::info!(title = %notification.title, "notification held until a subscriber attaches");
        match self.held.lock() {
            Ok(mut held) => held.push(notification),
            Err(_) => tracing::warn!("held notification queue poisoned; notification dropped"),
        }
    }
}

/// Interactive yes/no gate in front of destructive actions.
pub trait Confirm {
    fn confirm(&self, message: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, message: &str) -> bool {
        self(message)
    }
}

#[cfg(test)]
pub(crate) fn drain(receiver: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut result = Vec::new();
    while let Ok(notification) = receiver.try_recv() {
        result.push(notification);
    }
    result
}
