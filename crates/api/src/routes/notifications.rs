//! Notification routes — recipient-facing history and read-state CRUD, plus
//! the operator-only dispatch endpoint.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::UserRole;
use herald_engine::dispatch::DispatchResult;
use herald_engine::store::{ListFilters, NotificationInput, NotificationStore};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::ws::protocol::NotificationView;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications", post(send_notification))
        .route("/api/notifications", delete(delete_all_notifications))
        .route("/api/notifications/unread_count", get(unread_count))
        .route("/api/notifications/read_all", post(mark_all_read))
        .route("/api/notifications/{id}", get(get_notification))
        .route("/api/notifications/{id}", delete(delete_notification))
        .route("/api/notifications/{id}/read", post(mark_read))
        .route("/api/notifications/{id}/unread", post(mark_unread))
}

/// Only `super_admin` users may dispatch notifications by hand. The role is
/// read live — revoking it takes effect on the next request.
async fn require_operator(pool: &PgPool, user_id: Uuid) -> Result<(), AppError> {
    let role: Option<(UserRole,)> = sqlx::query_as("SELECT role FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    match role {
        Some((UserRole::SuperAdmin,)) => Ok(()),
        Some(_) => Err(AppError::Forbidden(
            "Operator role required to send notifications".to_string(),
        )),
        None => Err(AppError::Auth("Unknown user".to_string())),
    }
}

/// GET /api/notifications — List the caller's notifications, newest first.
async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filters): Query<ListFilters>,
) -> Result<Json<Vec<NotificationView>>, AppError> {
    let notifications =
        NotificationStore::list_by_user(&state.pool, auth.user_id, &filters).await?;

    let now = Utc::now();
    let views = notifications
        .iter()
        .map(|n| NotificationView::from_notification(n, now))
        .collect();
    Ok(Json(views))
}

/// GET /api/notifications/:id — Fetch one of the caller's notifications.
async fn get_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationView>, AppError> {
    let notification = NotificationStore::get(&state.pool, id, auth.user_id).await?;
    Ok(Json(NotificationView::from_notification(
        &notification,
        Utc::now(),
    )))
}

/// GET /api/notifications/unread_count
async fn unread_count(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = NotificationStore::unread_count(&state.pool, auth.user_id).await?;
    Ok(Json(json!({ "unread_count": count })))
}

/// POST /api/notifications/:id/read — Mark one notification as read and
/// relay the change to the caller's other live sessions.
async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationView>, AppError> {
    let notification = NotificationStore::mark_read(&state.pool, id, auth.user_id).await?;

    state
        .dispatcher
        .publish_update(
            auth.user_id,
            notification.id,
            json!({ "is_read": true, "read_at": notification.read_at }),
        )
        .await;

    Ok(Json(NotificationView::from_notification(
        &notification,
        Utc::now(),
    )))
}

/// POST /api/notifications/:id/unread
async fn mark_unread(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationView>, AppError> {
    let notification = NotificationStore::mark_unread(&state.pool, id, auth.user_id).await?;

    state
        .dispatcher
        .publish_update(
            auth.user_id,
            notification.id,
            json!({ "is_read": false, "read_at": null }),
        )
        .await;

    Ok(Json(NotificationView::from_notification(
        &notification,
        Utc::now(),
    )))
}

/// POST /api/notifications/read_all
async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = NotificationStore::mark_all_read(&state.pool, auth.user_id).await?;
    Ok(Json(
        json!({ "message": format!("{} notifications marked as read", count) }),
    ))
}

/// DELETE /api/notifications/:id
async fn delete_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = NotificationStore::delete(&state.pool, id, auth.user_id).await?;
    if deleted {
        Ok(Json(json!({ "deleted": true })))
    } else {
        Err(AppError::NotFound(format!("Notification {} not found", id)))
    }
}

/// DELETE /api/notifications — Clear the caller's notification history.
async fn delete_all_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = NotificationStore::delete_all(&state.pool, auth.user_id).await?;
    Ok(Json(
        json!({ "message": format!("{} notifications deleted", count) }),
    ))
}

/// Request body for the operator dispatch endpoint.
#[derive(Debug, Deserialize)]
struct SendNotificationRequest {
    user_ids: Vec<Uuid>,
    #[serde(flatten)]
    input: NotificationInput,
}

/// POST /api/notifications — Fan a notification out to a recipient set.
///
/// Each recipient gets an independent persisted record; the response reports
/// the per-recipient outcome rather than an aggregate success flag.
async fn send_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<SendNotificationRequest>,
) -> Result<Json<Vec<DispatchResult>>, AppError> {
    require_operator(&state.pool, auth.user_id).await?;

    if req.user_ids.is_empty() {
        return Err(AppError::Validation(
            "user_ids must name at least one recipient".to_string(),
        ));
    }

    let results = state
        .dispatcher
        .send_to_many(&req.user_ids, &req.input)
        .await;
    Ok(Json(results))
}
