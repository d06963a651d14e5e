use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Categories a notification can carry, shown to the client verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
    Course,
    Enrollment,
    Session,
    Library,
    System,
    UserRegistration,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::Info => write!(f, "info"),
            NotificationKind::Success => write!(f, "success"),
            NotificationKind::Warning => write!(f, "warning"),
            NotificationKind::Error => write!(f, "error"),
            NotificationKind::Course => write!(f, "course"),
            NotificationKind::Enrollment => write!(f, "enrollment"),
            NotificationKind::Session => write!(f, "session"),
            NotificationKind::Library => write!(f, "library"),
            NotificationKind::System => write!(f, "system"),
            NotificationKind::UserRegistration => write!(f, "user_registration"),
        }
    }
}

/// Delivery status of a persisted notification.
///
/// `Failed` means the live push was not confirmed — the record itself is
/// durable either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Queued => write!(f, "queued"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Channel a notification is addressed through. Only `InApp` is delivered by
/// this service; the others are persisted for out-of-band workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Push,
    Sms,
    InApp,
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationChannel::Email => write!(f, "email"),
            NotificationChannel::Push => write!(f, "push"),
            NotificationChannel::Sms => write!(f, "sms"),
            NotificationChannel::InApp => write!(f, "in_app"),
        }
    }
}

/// Roles a user can hold. `SuperAdmin` users are the privileged operators
/// notified about new registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Student,
    Teacher,
    Parent,
    Staff,
    SuperAdmin,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Student => write!(f, "student"),
            UserRole::Teacher => write!(f, "teacher"),
            UserRole::Parent => write!(f, "parent"),
            UserRole::Staff => write!(f, "staff"),
            UserRole::SuperAdmin => write!(f, "super_admin"),
        }
    }
}

/// A user in the system.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

/// A persisted notification addressed to exactly one recipient.
///
/// Immutable after creation except for `read_at` (recipient-driven) and
/// `status`/`sent_at` (system-driven).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel: NotificationChannel,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    /// Open string-keyed metadata, carried verbatim and interpreted only by
    /// the client.
    pub metadata: serde_json::Value,
    pub action_url: Option<String>,
    pub status: DeliveryStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Transport group name for a recipient's live sessions.
///
/// Naming convention over the generic pub/sub capability: every process that
/// holds a live session for `user_id` subscribes to this group.
pub fn notification_group(user_id: Uuid) -> String {
    format!("notifications_{}", user_id)
}

/// Message published on a recipient's transport group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GroupEvent {
    /// A freshly persisted notification to push to all live sessions.
    NewNotification { notification: Notification },
    /// A read-state change to relay to all live sessions.
    NotificationUpdated {
        notification_id: Uuid,
        updates: serde_json::Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_group_naming() {
        let id = Uuid::nil();
        assert_eq!(
            notification_group(id),
            "notifications_00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&NotificationKind::UserRegistration).unwrap(),
            r#""user_registration""#
        );
        assert_eq!(
            NotificationKind::UserRegistration.to_string(),
            "user_registration"
        );
        assert_eq!(NotificationKind::Info.to_string(), "info");
    }

    #[test]
    fn test_group_event_tagging() {
        let event = GroupEvent::NotificationUpdated {
            notification_id: Uuid::nil(),
            updates: serde_json::json!({"is_read": true}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"notification_updated""#));
        assert!(json.contains(r#""is_read":true"#));

        let back: GroupEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, GroupEvent::NotificationUpdated { .. }));
    }
}
