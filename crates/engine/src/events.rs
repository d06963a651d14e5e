//! Domain event bus and the user-registration fan-out hook.
//!
//! Entity-creation code emits events on an explicitly constructed bus; the
//! hook subscribes and turns each new-user event into a notification fan-out
//! to all privileged operators. Keeping the hook on its own task decouples it
//! from the registration's unit of work: dispatch failures are logged and can
//! never roll back the new user.

use std::sync::Arc;

use serde_json::json;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{NotificationKind, UserRole};

use crate::dispatch::Dispatcher;
use crate::store::NotificationInput;

/// Default buffer capacity for the event bus.
const DEFAULT_BUS_CAPACITY: usize = 256;

/// Domain events about user entities.
#[derive(Debug, Clone)]
pub enum UserEvent {
    /// A new user finished registration.
    Created {
        id: Uuid,
        email: String,
        full_name: String,
        role: UserRole,
    },
}

/// Broadcast bus carrying [`UserEvent`]s to any number of subscribers.
///
/// Events emitted with no subscribers are dropped; the emitting side never
/// blocks on consumers.
pub struct UserEventBus {
    tx: broadcast::Sender<UserEvent>,
}

impl UserEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: UserEvent) {
        tracing::debug!(
            subscribers = self.tx.receiver_count(),
            "User event emitted"
        );
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for UserEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

/// Subscribe to the bus and notify all privileged operators whenever a user
/// registers. Returns the handle of the spawned hook task.
pub fn spawn_user_registration_hook(
    bus: &UserEventBus,
    pool: PgPool,
    dispatcher: Arc<Dispatcher>,
    backend_url: String,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(UserEvent::Created {
                    id,
                    email,
                    full_name,
                    role,
                }) => {
                    if let Err(e) = notify_operators_of_registration(
                        &pool,
                        &dispatcher,
                        &backend_url,
                        id,
                        &email,
                        &full_name,
                        role,
                    )
                    .await
                    {
                        tracing::error!(
                            user_id = %id,
                            error = %e,
                            "User-registration fan-out failed"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Registration hook lagged behind the event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Fan a `user_registration` notification out to every current `super_admin`.
///
/// The operator set is queried live on each firing — it changes over time and
/// must never be cached.
async fn notify_operators_of_registration(
    pool: &PgPool,
    dispatcher: &Dispatcher,
    backend_url: &str,
    user_id: Uuid,
    email: &str,
    full_name: &str,
    role: UserRole,
) -> Result<(), AppError> {
    let operators: Vec<(Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE role = 'super_admin'")
            .fetch_all(pool)
            .await?;

    if operators.is_empty() {
        tracing::debug!(user_id = %user_id, "No operators to notify about registration");
        return Ok(());
    }

    let operator_ids: Vec<Uuid> = operators.into_iter().map(|(id,)| id).collect();
    let action_url = format!("{}/admin/users/{}", backend_url, user_id);

    let input = NotificationInput {
        kind: NotificationKind::UserRegistration,
        title: "New User Registration".to_string(),
        body: format!(
            "A new {} has registered: {} ({})",
            role, full_name, email
        ),
        action_url: Some(action_url.clone()),
        metadata: Some(json!({
            "user_id": user_id,
            "user_email": email,
            "user_full_name": full_name,
            "user_role": role,
            "admin_url": action_url,
        })),
        channel: None,
    };

    let results = dispatcher.send_to_many(&operator_ids, &input).await;

    for result in &results {
        if let Some(error) = &result.error {
            tracing::error!(
                operator_id = %result.user_id,
                error,
                "Failed to create registration notification for operator"
            );
        }
    }

    tracing::info!(
        user_id = %user_id,
        operators = results.len(),
        "Registration fan-out dispatched"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bus_emit_subscribe() {
        let bus = UserEventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit(UserEvent::Created {
            id: Uuid::nil(),
            email: "a@example.com".to_string(),
            full_name: "A".to_string(),
            role: UserRole::Student,
        });

        let UserEvent::Created { email, role, .. } = rx.recv().await.unwrap();
        assert_eq!(email, "a@example.com");
        assert_eq!(role, UserRole::Student);
    }

    #[tokio::test]
    async fn test_bus_emit_without_subscribers_is_ok() {
        let bus = UserEventBus::new(8);
        bus.emit(UserEvent::Created {
            id: Uuid::nil(),
            email: "b@example.com".to_string(),
            full_name: "B".to_string(),
            role: UserRole::Teacher,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_bus_multiple_subscribers() {
        let bus = UserEventBus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(UserEvent::Created {
            id: Uuid::nil(),
            email: "c@example.com".to_string(),
            full_name: "C".to_string(),
            role: UserRole::Staff,
        });

        assert!(matches!(rx1.recv().await, Ok(UserEvent::Created { .. })));
        assert!(matches!(rx2.recv().await, Ok(UserEvent::Created { .. })));
    }
}
