//! Life cycle of one live connection.
//!
//! Admission happens before the WebSocket upgrade: the connect-time token
//! must resolve to a verified recipient identity, otherwise the request is
//! rejected and no registry entry is ever created. An admitted session is
//! registered, acknowledged with a `connection_established` frame, and then
//! serviced by a single task that relays group pushes outward and handles
//! the small inbound command set until the connection dies.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

use herald_common::error::AppError;

use crate::middleware::auth::decode_jwt;
use crate::state::AppState;
use crate::ws::protocol::{ClientFrame, ServerFrame};
use crate::ws::registry::ConnectionRegistry;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/notifications", get(ws_notifications))
}

/// Connect-time credentials. Browsers cannot set headers on WebSocket
/// requests, so the token rides in the query string.
#[derive(Debug, Deserialize)]
struct WsAuthParams {
    token: Option<String>,
}

/// GET /ws/notifications?token=<JWT> — admit and upgrade a live session.
async fn ws_notifications(
    State(state): State<AppState>,
    Query(params): Query<WsAuthParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let token = params
        .token
        .ok_or_else(|| AppError::Auth("Missing token query parameter".to_string()))?;
    let claims = decode_jwt(&token, &state.config.jwt_secret)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Auth("Invalid user ID in token".to_string()))?;

    Ok(ws.on_upgrade(move |socket| handle_session(state, user_id, socket)))
}

/// Deregisters the session when dropped, on every exit path including task
/// cancellation. `ConnectionRegistry::deregister` is idempotent, so a close
/// race cannot double-remove.
struct SessionGuard {
    registry: Arc<ConnectionRegistry>,
    user_id: Uuid,
    session_id: Uuid,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.deregister(self.user_id, self.session_id);
    }
}

async fn handle_session(state: AppState, user_id: Uuid, mut socket: WebSocket) {
    let session_id = Uuid::new_v4();
    let mut pushes = state.registry.register(user_id, session_id).await;
    let _guard = SessionGuard {
        registry: state.registry.clone(),
        user_id,
        session_id,
    };
    tracing::info!(user_id = %user_id, session_id = %session_id, "Live session opened");

    let hello = ServerFrame::ConnectionEstablished {
        message: "Connected to notifications".to_string(),
    };
    if send_frame(&mut socket, &hello).await.is_err() {
        return;
    }

    // Clients ping every ws_ping_interval_secs; silence beyond the
    // configured multiple means a dead connection.
    let idle_timeout = Duration::from_secs(state.config.ws_idle_timeout_secs());
    let mut idle_check = tokio::time::interval(Duration::from_secs(
        state.config.ws_ping_interval_secs.max(1),
    ));
    idle_check.reset();
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            _ = idle_check.tick() => {
                if last_activity.elapsed() > idle_timeout {
                    tracing::info!(
                        session_id = %session_id,
                        idle_secs = last_activity.elapsed().as_secs(),
                        "Keepalive timeout, closing session"
                    );
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
            push = pushes.recv() => {
                match push {
                    Ok(event) => {
                        let frame = ServerFrame::from_group_event(event, Utc::now());
                        if send_frame(&mut socket, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Best-effort push: the skipped records stay queryable.
                        tracing::warn!(session_id = %session_id, skipped, "Session lagged behind pushes");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            inbound = socket.recv() => {
                let Some(message) = inbound else {
                    break;
                };
                last_activity = Instant::now();

                match message {
                    Ok(Message::Text(raw)) => {
                        if handle_client_frame(&mut socket, session_id, &raw).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(session_id = %session_id, error = %e, "Socket error");
                        break;
                    }
                }
            }
        }
    }

    tracing::info!(user_id = %user_id, session_id = %session_id, "Live session closed");
    // _guard deregisters here.
}

/// Handle one inbound text frame. Unknown frame types are tolerated;
/// malformed JSON gets an error frame back without ending the session.
async fn handle_client_frame(
    socket: &mut WebSocket,
    session_id: Uuid,
    raw: &str,
) -> Result<(), axum::Error> {
    match serde_json::from_str::<ClientFrame>(raw) {
        Ok(ClientFrame::Ping) => send_frame(socket, &ServerFrame::Pong).await,
        Ok(ClientFrame::Unknown) => {
            tracing::debug!(session_id = %session_id, "Ignoring unknown client frame type");
            Ok(())
        }
        Err(_) => {
            send_frame(
                socket,
                &ServerFrame::Error {
                    message: "Invalid JSON".to_string(),
                },
            )
            .await
        }
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}
