//! Notification display and click events.

use crate::error::Result;
use crate::push::{NotificationDescriptor, ACTION_DISMISS, ACTION_VIEW};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;

/// Where notifications are shown.
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    /// Display a notification. Resolves once it is shown.
    async fn show(&self, notification: &NotificationDescriptor) -> Result<()>;

    /// Close every visible notification with this tag.
    async fn close(&self, tag: &str) -> Result<()>;
}

/// Keeps shown notifications in memory so they can be listed.
#[derive(Debug, Default)]
pub struct MemoryNotificationSurface {
    visible: Mutex<Vec<NotificationDescriptor>>,
    shown_total: Mutex<usize>,
}

impl MemoryNotificationSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications currently visible, oldest first.
    pub fn visible(&self) -> Vec<NotificationDescriptor> {
        self.visible.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of notifications ever shown.
    pub fn shown_total(&self) -> usize {
        *self.shown_total.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl NotificationSurface for MemoryNotificationSurface {
    async fn show(&self, notification: &NotificationDescriptor) -> Result<()> {
        let mut visible = self.visible.lock().unwrap_or_else(|e| e.into_inner());
        // A new notification replaces any visible one with the same tag.
        visible.retain(|n| n.tag != notification.tag);
        visible.push(notification.clone());
        *self.shown_total.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        info!("Notification shown: {}", notification.title);
        Ok(())
    }

    async fn close(&self, tag: &str) -> Result<()> {
        self.visible
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|n| n.tag != tag);
        Ok(())
    }
}

/// Writes notifications to the log instead of displaying them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSurface;

#[async_trait]
impl NotificationSurface for LogNotificationSurface {
    async fn show(&self, notification: &NotificationDescriptor) -> Result<()> {
        info!(
            tag = %notification.tag,
            "Notification: {} - {}",
            notification.title,
            notification.body
        );
        Ok(())
    }

    async fn close(&self, tag: &str) -> Result<()> {
        info!(tag = %tag, "Notification closed");
        Ok(())
    }
}

/// A click on a notification or one of its buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationClick {
    pub tag: String,
    /// Button id, absent for a click on the notification body.
    #[serde(default)]
    pub action: Option<String>,
}

impl NotificationClick {
    pub fn body(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            action: None,
        }
    }

    pub fn action(tag: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            action: Some(action.into()),
        }
    }

    pub fn kind(&self) -> ClickKind {
        match self.action.as_deref() {
            None | Some("") | Some(ACTION_VIEW) | Some("open") => ClickKind::Open,
            Some(ACTION_DISMISS) => ClickKind::Dismiss,
            Some(_) => ClickKind::Unknown,
        }
    }
}

/// What the user asked for by clicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    /// Body click or the view/open button.
    Open,
    Dismiss,
    Unknown,
}

/// What the click handler did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "outcome")]
pub enum ClickOutcome {
    /// An existing window was focused.
    Focused { client_id: String },
    /// A new window was opened.
    Opened { client_id: String, url: String },
    Dismissed,
    Ignored,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;
    use crate::push::{build_notification, PushMessage};

    #[test]
    fn test_click_kinds() {
        assert_eq!(NotificationClick::body("t").kind(), ClickKind::Open);
        assert_eq!(NotificationClick::action("t", "view").kind(), ClickKind::Open);
        assert_eq!(NotificationClick::action("t", "open").kind(), ClickKind::Open);
        assert_eq!(NotificationClick::action("t", "dismiss").kind(), ClickKind::Dismiss);
        assert_eq!(NotificationClick::action("t", "snooze").kind(), ClickKind::Unknown);
    }

    #[test]
    fn test_click_deserializes_without_action() {
        let click: NotificationClick = serde_json::from_str(r#"{"tag":"mikel-coffee-notification"}"#).unwrap();
        assert_eq!(click.action, None);
    }

    #[tokio::test]
    async fn test_memory_surface_replaces_same_tag() {
        let surface = MemoryNotificationSurface::new();
        let config = NotificationConfig::default();
        let first = build_notification(&config, &PushMessage::from_bytes("first"));
        let second = build_notification(&config, &PushMessage::from_bytes("second"));

        surface.show(&first).await.unwrap();
        surface.show(&second).await.unwrap();
        assert_eq!(surface.visible().len(), 1);
        assert_eq!(surface.visible()[0].body, "second");
        assert_eq!(surface.shown_total(), 2);

        surface.close(&config.tag).await.unwrap();
        assert!(surface.visible().is_empty());
    }
}
