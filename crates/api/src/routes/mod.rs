pub mod health;
pub mod notifications;
pub mod users;

use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(notifications::router())
        .merge(users::router())
        .merge(ws::session::router())
        .with_state(state)
}
