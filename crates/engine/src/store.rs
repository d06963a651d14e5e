//! Notification record store — persistence operations over the
//! `notifications` table.
//!
//! The dispatch path only calls `create` and `update_status`; the remaining
//! operations back the recipient-facing HTTP surface. Store unavailability
//! surfaces as an error to the caller; nothing is silently dropped.

use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{
    DeliveryStatus, Notification, NotificationChannel, NotificationKind,
};

/// Content of a notification to be created, minus the system-owned fields.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NotificationInput {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub channel: Option<NotificationChannel>,
}

/// Filters for listing a recipient's notifications.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ListFilters {
    pub is_read: Option<bool>,
    pub kind: Option<NotificationKind>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Default page size for listings.
const DEFAULT_PAGE_SIZE: i64 = 50;
/// Upper bound a caller can request per page.
const MAX_PAGE_SIZE: i64 = 100;

/// Service layer for notification persistence.
pub struct NotificationStore;

impl NotificationStore {
    /// Persist a new notification for `user_id` in state `queued`.
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        input: &NotificationInput,
    ) -> Result<Notification, AppError> {
        let id = Uuid::new_v4();
        let metadata = input.metadata.clone().unwrap_or(serde_json::json!({}));
        let channel = input.channel.unwrap_or(NotificationChannel::InApp);

        let notification: Notification = sqlx::query_as(
            r#"
            INSERT INTO notifications (id, user_id, channel, kind, title, body, metadata, action_url, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(channel.to_string())
        .bind(input.kind.to_string())
        .bind(&input.title)
        .bind(&input.body)
        .bind(&metadata)
        .bind(&input.action_url)
        .bind(DeliveryStatus::Queued.to_string())
        .fetch_one(pool)
        .await?;

        tracing::debug!(
            notification_id = %notification.id,
            user_id = %user_id,
            kind = %input.kind,
            "Notification created"
        );

        Ok(notification)
    }

    /// Record the outcome of the live-push attempt. `sent` also stamps
    /// `sent_at`.
    pub async fn update_status(
        pool: &PgPool,
        id: Uuid,
        status: DeliveryStatus,
    ) -> Result<Notification, AppError> {
        let notification: Notification = sqlx::query_as(
            r#"
            UPDATE notifications
            SET status = $1,
                sent_at = CASE WHEN $1 = 'sent' THEN now() ELSE sent_at END,
                updated_at = now()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(status.to_string())
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))?;

        Ok(notification)
    }

    /// Get one of the recipient's own notifications.
    pub async fn get(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<Notification, AppError> {
        let notification: Notification =
            sqlx::query_as("SELECT * FROM notifications WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))?;

        Ok(notification)
    }

    /// List the recipient's notifications, newest first.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: Uuid,
        filters: &ListFilters,
    ) -> Result<Vec<Notification>, AppError> {
        let limit = filters
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = filters.offset.unwrap_or(0).max(0);

        let notifications: Vec<Notification> = sqlx::query_as(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1
              AND ($2::boolean IS NULL OR (read_at IS NOT NULL) = $2)
              AND ($3::text IS NULL OR kind = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(user_id)
        .bind(filters.is_read)
        .bind(filters.kind.map(|k| k.to_string()))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(notifications)
    }

    /// Mark one of the recipient's notifications as read. Already-read
    /// records keep their original `read_at`.
    pub async fn mark_read(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Notification, AppError> {
        let notification: Notification = sqlx::query_as(
            r#"
            UPDATE notifications
            SET read_at = COALESCE(read_at, now()), updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))?;

        Ok(notification)
    }

    /// Clear the read flag on one of the recipient's notifications.
    pub async fn mark_unread(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Notification, AppError> {
        let notification: Notification = sqlx::query_as(
            r#"
            UPDATE notifications
            SET read_at = NULL, updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))?;

        Ok(notification)
    }

    /// Mark every unread notification for `user_id` as read. Returns the
    /// number of rows touched.
    pub async fn mark_all_read(pool: &PgPool, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET read_at = now(), updated_at = now()
            WHERE user_id = $1 AND read_at IS NULL
            "#,
        )
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Count unread notifications for `user_id`.
    pub async fn unread_count(pool: &PgPool, user_id: Uuid) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Delete one of the recipient's notifications. Returns true if it existed.
    pub async fn delete(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete all of the recipient's notifications. Returns the number removed.
    pub async fn delete_all(pool: &PgPool, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM notifications WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}
