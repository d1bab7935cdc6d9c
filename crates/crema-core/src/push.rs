//! Push payload → notification descriptor.
//!
//! Payloads are untrusted: malformed JSON, non-object JSON, or an empty body
//! never fail the handler, they fall back to the configured defaults.

use crate::config::NotificationConfig;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A push message as delivered by the push service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushMessage {
    pub data: Option<Bytes>,
}

impl PushMessage {
    /// A push without a payload.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            data: (!data.is_empty()).then_some(data),
        }
    }

    /// Payload decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Option<String> {
        self.data
            .as_ref()
            .map(|data| String::from_utf8_lossy(data).into_owned())
    }

    /// Payload parsed as JSON.
    pub fn json(&self) -> Option<serde_json::Result<Value>> {
        self.data.as_ref().map(|data| serde_json::from_slice(data))
    }
}

/// A button shown on the notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Everything the notification surface needs to display a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDescriptor {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    /// Parsed payload, or an empty object when the payload was not JSON.
    pub data: Value,
    pub vibrate: Vec<u32>,
    pub actions: Vec<NotificationAction>,
    pub require_interaction: bool,
}

/// Action id of the "open the app" button.
pub const ACTION_VIEW: &str = "view";
/// Action id of the "dismiss" button.
pub const ACTION_DISMISS: &str = "dismiss";

/// Build the notification for a push message.
pub fn build_notification(config: &NotificationConfig, message: &PushMessage) -> NotificationDescriptor {
    let mut title = config.default_title.clone();
    let mut body = config.default_body.clone();
    let mut data = Value::Object(Map::new());

    match message.json() {
        Some(Ok(value)) => {
            if let Some(t) = non_empty_str(&value, "title") {
                title = t.to_string();
            }
            if let Some(b) = non_empty_str(&value, "body").or_else(|| non_empty_str(&value, "message")) {
                body = b.to_string();
            }
            data = value;
        }
        Some(Err(_)) => {
            if let Some(text) = message.text().filter(|t| !t.is_empty()) {
                body = text;
            }
        }
        None => {}
    }

    NotificationDescriptor {
        title,
        body,
        icon: config.icon.clone(),
        badge: config.badge.clone(),
        tag: config.tag.clone(),
        data,
        vibrate: config.vibrate.clone(),
        actions: vec![
            NotificationAction {
                action: ACTION_VIEW.to_string(),
                title: config.view_action_title.clone(),
            },
            NotificationAction {
                action: ACTION_DISMISS.to_string(),
                title: config.dismiss_action_title.clone(),
            },
        ],
        require_interaction: config.require_interaction,
    }
}

fn non_empty_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
