//! Notification dispatch — the single entry point for producing a
//! notification.
//!
//! Persist first, then push: every dispatch writes a durable record in state
//! `queued`, attempts a best-effort publish to the recipient's transport
//! group, and records the outcome as `sent` or `failed`. Callers are told the
//! operation succeeded once persistence succeeds, independent of live
//! delivery.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{DeliveryStatus, GroupEvent, Notification, notification_group};
use herald_transport::GroupTransport;

use crate::store::{NotificationInput, NotificationStore};

/// Per-recipient outcome of a fan-out dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeliveryStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Dispatcher {
    pool: PgPool,
    transport: Arc<dyn GroupTransport>,
    publish_timeout: Duration,
}

impl Dispatcher {
    pub fn new(pool: PgPool, transport: Arc<dyn GroupTransport>, publish_timeout: Duration) -> Self {
        Self {
            pool,
            transport,
            publish_timeout,
        }
    }

    /// Persist one notification for `user_id` and push it to whatever live
    /// sessions the recipient has right now.
    ///
    /// A persistence failure is returned to the caller. A publish failure is
    /// absorbed: the record survives with status `failed` and the call still
    /// succeeds. The returned record carries the final status — never
    /// `queued`.
    pub async fn send_to_one(
        &self,
        user_id: Uuid,
        input: &NotificationInput,
    ) -> Result<Notification, AppError> {
        let notification = NotificationStore::create(&self.pool, user_id, input).await?;

        let status = match self
            .publish_event(
                user_id,
                &GroupEvent::NewNotification {
                    notification: notification.clone(),
                },
            )
            .await
        {
            Ok(()) => DeliveryStatus::Sent,
            Err(e) => {
                tracing::warn!(
                    notification_id = %notification.id,
                    user_id = %user_id,
                    error = %e,
                    "Live push failed; notification kept as failed"
                );
                DeliveryStatus::Failed
            }
        };

        NotificationStore::update_status(&self.pool, notification.id, status).await
    }

    /// Apply `send_to_one` once per unique recipient.
    ///
    /// Recipients are processed independently: a store or transport failure
    /// for one never aborts or rolls back the others. The result reports each
    /// recipient's created id and final status (or the error that prevented
    /// creation).
    pub async fn send_to_many(
        &self,
        user_ids: &[Uuid],
        input: &NotificationInput,
    ) -> Vec<DispatchResult> {
        let mut results = Vec::new();

        for user_id in dedup_preserving_order(user_ids) {
            match self.send_to_one(user_id, input).await {
                Ok(notification) => results.push(DispatchResult {
                    user_id,
                    notification_id: Some(notification.id),
                    status: Some(notification.status),
                    error: None,
                }),
                Err(e) => {
                    tracing::error!(user_id = %user_id, error = %e, "Dispatch failed for recipient");
                    results.push(DispatchResult {
                        user_id,
                        notification_id: None,
                        status: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        results
    }

    /// Relay a read-state change to the recipient's live sessions.
    /// Best-effort: failures are logged, the persisted record already holds
    /// the authoritative state.
    pub async fn publish_update(
        &self,
        user_id: Uuid,
        notification_id: Uuid,
        updates: serde_json::Value,
    ) {
        let event = GroupEvent::NotificationUpdated {
            notification_id,
            updates,
        };
        if let Err(e) = self.publish_event(user_id, &event).await {
            tracing::warn!(
                notification_id = %notification_id,
                user_id = %user_id,
                error = %e,
                "Failed to push notification update"
            );
        }
    }

    /// Serialize and publish a group event, bounded by the publish timeout so
    /// a slow transport cannot stall the dispatcher.
    async fn publish_event(&self, user_id: Uuid, event: &GroupEvent) -> Result<(), AppError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| AppError::Internal(format!("Failed to encode group event: {}", e)))?;
        let group = notification_group(user_id);

        tokio::time::timeout(self.publish_timeout, self.transport.publish(&group, &payload))
            .await
            .map_err(|_| {
                AppError::Publish(format!(
                    "Publish to {} timed out after {:?}",
                    group, self.publish_timeout
                ))
            })?
    }
}

/// Drop duplicate recipient ids, keeping first-seen order.
fn dedup_preserving_order(user_ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    user_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_preserving_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert_eq!(dedup_preserving_order(&[a, b, a, c, b]), vec![a, b, c]);
    }

    #[test]
    fn test_dedup_empty() {
        assert!(dedup_preserving_order(&[]).is_empty());
    }
}
