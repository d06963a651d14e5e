//! User registration route.
//!
//! Registration emits a `UserEvent::Created` on the event bus after the row
//! is committed; the registration hook fans the news out to operators on its
//! own task. The response never depends on that fan-out.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{User, UserRole};
use herald_engine::events::UserEvent;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/users", post(register_user))
}

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
}

/// POST /api/users — Register a new user.
async fn register_user(
    State(state): State<AppState>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<Json<User>, AppError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }
    if req.full_name.trim().is_empty() {
        return Err(AppError::Validation("full_name is required".to_string()));
    }

    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;
    if existing.is_some() {
        return Err(AppError::Validation("Email already registered".to_string()));
    }

    let user: User = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, full_name, role)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(req.full_name.trim())
    .bind(req.role.to_string())
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(user_id = %user.id, role = %user.role, "User registered");

    state.events.emit(UserEvent::Created {
        id: user.id,
        email: user.email.clone(),
        full_name: user.full_name.clone(),
        role: user.role,
    });

    Ok(Json(user))
}
