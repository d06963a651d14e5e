//! Per-process registry of live sessions.
//!
//! Maps each recipient to the set of sessions currently open in this process
//! and owns one transport-group subscription per locally-connected recipient:
//! the first session for a recipient starts a pump task that forwards group
//! messages into a local broadcast channel, and the last session to leave
//! tears it down. Every session gets its own broadcast receiver, so one group
//! message reaches each live session exactly once.
//!
//! The registry is explicitly constructed and passed to every session handler
//! through the application state; it holds the only intra-process shared
//! mutable state, behind a mutex that is never held across an await.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use herald_common::types::{GroupEvent, notification_group};
use herald_transport::GroupTransport;

/// Buffer for the per-recipient local fan-out channel. A session that falls
/// further behind than this skips ahead; the persisted record is the
/// durability guarantee.
const LOCAL_FANOUT_BUFFER: usize = 64;

struct RecipientEntry {
    sessions: HashSet<Uuid>,
    fanout: broadcast::Sender<GroupEvent>,
    pump: JoinHandle<()>,
    ready: watch::Receiver<bool>,
}

pub struct ConnectionRegistry {
    transport: Arc<dyn GroupTransport>,
    recipients: Mutex<HashMap<Uuid, RecipientEntry>>,
}

impl ConnectionRegistry {
    pub fn new(transport: Arc<dyn GroupTransport>) -> Self {
        Self {
            transport,
            recipients: Mutex::new(HashMap::new()),
        }
    }

    /// Add a session under a recipient and return the stream of group events
    /// for that recipient. Idempotent per session id.
    ///
    /// The first session for a recipient subscribes the process to the
    /// recipient's transport group; the call returns once that subscription
    /// is established, so a push right after admission is not missed.
    pub async fn register(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> broadcast::Receiver<GroupEvent> {
        let (rx, mut ready) = {
            let mut recipients = self.recipients.lock().unwrap();
            let entry = recipients
                .entry(user_id)
                .or_insert_with(|| self.spawn_entry(user_id));
            entry.sessions.insert(session_id);
            (entry.fanout.subscribe(), entry.ready.clone())
        };

        if !*ready.borrow() {
            let _ = ready.changed().await;
        }
        rx
    }

    /// Remove a session. Idempotent: a second close of the same session (or
    /// a close racing the server-side teardown) is a no-op. When the
    /// recipient's last session leaves, the group subscription is dropped.
    pub fn deregister(&self, user_id: Uuid, session_id: Uuid) {
        let mut recipients = self.recipients.lock().unwrap();
        let now_empty = match recipients.get_mut(&user_id) {
            Some(entry) => entry.sessions.remove(&session_id) && entry.sessions.is_empty(),
            None => false,
        };
        if now_empty
            && let Some(entry) = recipients.remove(&user_id)
        {
            entry.pump.abort();
            tracing::debug!(user_id = %user_id, "Last session gone, group subscription dropped");
        }
    }

    /// Session ids currently open for a recipient. Introspection and tests
    /// only — the publish path goes through the transport, never through a
    /// registry lookup, so recipients on other processes stay reachable.
    pub fn sessions_for(&self, user_id: Uuid) -> HashSet<Uuid> {
        self.recipients
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|entry| entry.sessions.clone())
            .unwrap_or_default()
    }

    /// Number of recipients with at least one live session in this process.
    pub fn connected_recipients(&self) -> usize {
        self.recipients.lock().unwrap().len()
    }

    /// Build a fresh entry: local broadcast channel plus the pump task that
    /// feeds it from the recipient's transport group.
    fn spawn_entry(&self, user_id: Uuid) -> RecipientEntry {
        let (fanout, _) = broadcast::channel(LOCAL_FANOUT_BUFFER);
        let (ready_tx, ready_rx) = watch::channel(false);
        let pump = tokio::spawn(run_pump(
            self.transport.clone(),
            notification_group(user_id),
            fanout.clone(),
            ready_tx,
        ));

        RecipientEntry {
            sessions: HashSet::new(),
            fanout,
            pump,
            ready: ready_rx,
        }
    }
}

/// Forward group payloads into the local broadcast channel until the
/// subscription ends or the task is aborted by the last deregistration.
async fn run_pump(
    transport: Arc<dyn GroupTransport>,
    group: String,
    fanout: broadcast::Sender<GroupEvent>,
    ready: watch::Sender<bool>,
) {
    let mut source = match transport.subscribe(&group).await {
        Ok(source) => {
            let _ = ready.send(true);
            source
        }
        Err(e) => {
            // Sessions stay connected but get no live pushes; the persisted
            // records remain queryable over HTTP.
            tracing::error!(group, error = %e, "Transport group subscription failed");
            let _ = ready.send(true);
            return;
        }
    };

    while let Some(payload) = source.recv().await {
        match serde_json::from_str::<GroupEvent>(&payload) {
            Ok(event) => {
                let _ = fanout.send(event);
            }
            Err(e) => {
                tracing::warn!(group, error = %e, "Dropping malformed group payload");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_common::types::{
        DeliveryStatus, Notification, NotificationChannel, NotificationKind,
    };
    use herald_transport::LocalTransport;

    fn sample_event() -> GroupEvent {
        let now = chrono::Utc::now();
        GroupEvent::NewNotification {
            notification: Notification {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                channel: NotificationChannel::InApp,
                kind: NotificationKind::Info,
                title: "t".to_string(),
                body: "b".to_string(),
                metadata: serde_json::json!({}),
                action_url: None,
                status: DeliveryStatus::Queued,
                sent_at: None,
                read_at: None,
                created_at: now,
                updated_at: now,
            },
        }
    }

    fn registry_with_transport() -> (Arc<LocalTransport>, ConnectionRegistry) {
        let transport = Arc::new(LocalTransport::new());
        let registry = ConnectionRegistry::new(transport.clone());
        (transport, registry)
    }

    #[tokio::test]
    async fn test_registered_session_receives_group_events() {
        let (transport, registry) = registry_with_transport();
        let user = Uuid::new_v4();
        let mut rx = registry.register(user, Uuid::new_v4()).await;

        let payload = serde_json::to_string(&sample_event()).unwrap();
        transport
            .publish(&notification_group(user), &payload)
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, GroupEvent::NewNotification { .. }));
    }

    #[tokio::test]
    async fn test_two_sessions_each_receive_once() {
        let (transport, registry) = registry_with_transport();
        let user = Uuid::new_v4();
        let mut rx1 = registry.register(user, Uuid::new_v4()).await;
        let mut rx2 = registry.register(user, Uuid::new_v4()).await;
        assert_eq!(registry.sessions_for(user).len(), 2);

        let payload = serde_json::to_string(&sample_event()).unwrap();
        transport
            .publish(&notification_group(user), &payload)
            .await
            .unwrap();

        assert!(matches!(
            rx1.recv().await.unwrap(),
            GroupEvent::NewNotification { .. }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            GroupEvent::NewNotification { .. }
        ));
        // Exactly once per session: nothing further is queued.
        assert!(matches!(
            rx1.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        assert!(matches!(
            rx2.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_register_is_idempotent_per_session_id() {
        let (_transport, registry) = registry_with_transport();
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();

        registry.register(user, session).await;
        registry.register(user, session).await;
        assert_eq!(registry.sessions_for(user).len(), 1);
    }

    #[tokio::test]
    async fn test_deregister_is_idempotent() {
        let (_transport, registry) = registry_with_transport();
        let user = Uuid::new_v4();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        registry.register(user, s1).await;
        registry.register(user, s2).await;

        registry.deregister(user, s1);
        let after_once = registry.sessions_for(user);
        // Closing the same session again (close race) changes nothing.
        registry.deregister(user, s1);
        assert_eq!(registry.sessions_for(user), after_once);
        assert_eq!(after_once.len(), 1);

        registry.deregister(user, s2);
        assert!(registry.sessions_for(user).is_empty());
        assert_eq!(registry.connected_recipients(), 0);

        // Fully-closed recipients can also be "closed" again harmlessly.
        registry.deregister(user, s2);
    }

    #[tokio::test]
    async fn test_recipient_resubscribes_after_reconnect() {
        let (transport, registry) = registry_with_transport();
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();

        registry.register(user, session).await;
        registry.deregister(user, session);

        // A fresh session gets a fresh group subscription.
        let mut rx = registry.register(user, Uuid::new_v4()).await;
        let payload = serde_json::to_string(&sample_event()).unwrap();
        transport
            .publish(&notification_group(user), &payload)
            .await
            .unwrap();
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_group_payload_is_dropped() {
        let (transport, registry) = registry_with_transport();
        let user = Uuid::new_v4();
        let mut rx = registry.register(user, Uuid::new_v4()).await;
        let group = notification_group(user);

        transport.publish(&group, "{ not json").await.unwrap();
        let payload = serde_json::to_string(&sample_event()).unwrap();
        transport.publish(&group, &payload).await.unwrap();

        // Only the well-formed event comes through.
        assert!(matches!(
            rx.recv().await.unwrap(),
            GroupEvent::NewNotification { .. }
        ));
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_sessions_are_scoped_per_recipient() {
        let (transport, registry) = registry_with_transport();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut alice_rx = registry.register(alice, Uuid::new_v4()).await;
        let mut bob_rx = registry.register(bob, Uuid::new_v4()).await;

        let payload = serde_json::to_string(&sample_event()).unwrap();
        transport
            .publish(&notification_group(alice), &payload)
            .await
            .unwrap();

        assert!(alice_rx.recv().await.is_ok());
        assert!(matches!(
            bob_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
