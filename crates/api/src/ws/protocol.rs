//! JSON frames exchanged over the live connection.
//!
//! Server frames are tagged with a `type` field; unknown inbound types are
//! accepted and ignored so older servers tolerate newer clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use herald_common::timeago::time_ago;
use herald_common::types::{GroupEvent, Notification, NotificationKind};

/// Public view of a notification as pushed to clients and returned by the
/// listing endpoints. `time_ago` is derived at serialization time.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub time_ago: String,
    pub created_at: DateTime<Utc>,
}

impl NotificationView {
    pub fn from_notification(notification: &Notification, now: DateTime<Utc>) -> Self {
        Self {
            id: notification.id,
            kind: notification.kind,
            title: notification.title.clone(),
            body: notification.body.clone(),
            action_url: notification.action_url.clone(),
            is_read: notification.is_read(),
            time_ago: time_ago(notification.created_at, now),
            created_at: notification.created_at,
        }
    }
}

/// Server → client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    ConnectionEstablished {
        message: String,
    },
    NewNotification {
        notification: NotificationView,
    },
    NotificationUpdated {
        notification_id: Uuid,
        updates: serde_json::Value,
    },
    Pong,
    Error {
        message: String,
    },
}

impl ServerFrame {
    /// Translate a transport group event into the client-facing frame,
    /// deriving the relative-age string at send time.
    pub fn from_group_event(event: GroupEvent, now: DateTime<Utc>) -> Self {
        match event {
            GroupEvent::NewNotification { notification } => ServerFrame::NewNotification {
                notification: NotificationView::from_notification(&notification, now),
            },
            GroupEvent::NotificationUpdated {
                notification_id,
                updates,
            } => ServerFrame::NotificationUpdated {
                notification_id,
                updates,
            },
        }
    }
}

/// Client → server frames. Anything with an unrecognized `type` parses to
/// `Unknown` and is ignored rather than terminating the session.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use herald_common::types::{DeliveryStatus, NotificationChannel};

    fn sample_notification(created_at: DateTime<Utc>) -> Notification {
        Notification {
            id: Uuid::nil(),
            user_id: Uuid::new_v4(),
            channel: NotificationChannel::InApp,
            kind: NotificationKind::UserRegistration,
            title: "New User Registration".to_string(),
            body: "A new student has registered".to_string(),
            metadata: serde_json::json!({"user_email": "john@example.com"}),
            action_url: Some("/admin/users/1".to_string()),
            status: DeliveryStatus::Sent,
            sent_at: Some(created_at),
            read_at: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_new_notification_frame_shape() {
        let now = Utc::now();
        let frame = ServerFrame::from_group_event(
            GroupEvent::NewNotification {
                notification: sample_notification(now - Duration::minutes(5)),
            },
            now,
        );
        let json = serde_json::to_value(&frame).unwrap();

        assert_eq!(json["type"], "new_notification");
        assert_eq!(json["notification"]["type"], "user_registration");
        assert_eq!(json["notification"]["title"], "New User Registration");
        assert_eq!(json["notification"]["is_read"], false);
        assert_eq!(json["notification"]["time_ago"], "5 minutes ago");
        assert_eq!(json["notification"]["action_url"], "/admin/users/1");
        // The full record's internals stay server-side.
        assert!(json["notification"].get("status").is_none());
        assert!(json["notification"].get("metadata").is_none());
    }

    #[test]
    fn test_connection_established_shape() {
        let frame = ServerFrame::ConnectionEstablished {
            message: "Connected to notifications".to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"connection_established""#));
        assert!(json.contains("Connected to notifications"));
    }

    #[test]
    fn test_notification_updated_shape() {
        let frame = ServerFrame::from_group_event(
            GroupEvent::NotificationUpdated {
                notification_id: Uuid::nil(),
                updates: serde_json::json!({"is_read": true}),
            },
            Utc::now(),
        );
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "notification_updated");
        assert_eq!(json["updates"]["is_read"], true);
    }

    #[test]
    fn test_client_ping_parses() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Ping));
    }

    #[test]
    fn test_unknown_client_type_tolerated() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"subscribe_to_topic","topic":"x"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Unknown));
    }

    #[test]
    fn test_malformed_client_frame_rejected() {
        assert!(serde_json::from_str::<ClientFrame>("not json").is_err());
        assert!(serde_json::from_str::<ClientFrame>(r#"{"no_type":1}"#).is_err());
    }
}
