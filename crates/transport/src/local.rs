//! In-process group transport.
//!
//! Backs single-process deployments and tests: groups map to
//! `tokio::sync::broadcast` channels held in a shared map. Delivery semantics
//! match the Redis transport — only subscribers that existed at publish time
//! receive the payload, and publishing to an empty group succeeds.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use herald_common::error::AppError;

use crate::{GroupTransport, SUBSCRIPTION_BUFFER};

pub struct LocalTransport {
    groups: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live subscribers on a group. Test introspection only.
    pub fn subscriber_count(&self, group: &str) -> usize {
        self.groups
            .lock()
            .unwrap()
            .get(group)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GroupTransport for LocalTransport {
    async fn publish(&self, group: &str, payload: &str) -> Result<(), AppError> {
        let mut groups = self.groups.lock().unwrap();
        if let Some(tx) = groups.get(group) {
            // Err means every subscriber is gone; drop the stale entry.
            if tx.send(payload.to_string()).is_err() {
                groups.remove(group);
            }
        }
        Ok(())
    }

    async fn subscribe(&self, group: &str) -> Result<mpsc::Receiver<String>, AppError> {
        let mut broadcast_rx = {
            let mut groups = self.groups.lock().unwrap();
            groups
                .entry(group.to_string())
                .or_insert_with(|| broadcast::channel(SUBSCRIPTION_BUFFER).0)
                .subscribe()
        };

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = broadcast_rx.recv() => {
                        match result {
                            Ok(payload) => {
                                if tx.send(payload).await.is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "Local transport subscriber lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let transport = LocalTransport::new();
        transport.publish("notifications_x", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_payload() {
        let transport = LocalTransport::new();
        let mut rx = transport.subscribe("g1").await.unwrap();

        transport.publish("g1", "payload-1").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "payload-1");
    }

    #[tokio::test]
    async fn test_groups_are_isolated() {
        let transport = LocalTransport::new();
        let mut rx_a = transport.subscribe("a").await.unwrap();
        let mut rx_b = transport.subscribe("b").await.unwrap();

        transport.publish("a", "for-a").await.unwrap();
        assert_eq!(rx_a.recv().await.unwrap(), "for-a");

        transport.publish("b", "for-b").await.unwrap();
        assert_eq!(rx_b.recv().await.unwrap(), "for-b");
    }

    #[tokio::test]
    async fn test_two_subscribers_both_receive() {
        let transport = LocalTransport::new();
        let mut rx1 = transport.subscribe("g").await.unwrap();
        let mut rx2 = transport.subscribe("g").await.unwrap();

        transport.publish("g", "fan-out").await.unwrap();
        assert_eq!(rx1.recv().await.unwrap(), "fan-out");
        assert_eq!(rx2.recv().await.unwrap(), "fan-out");
    }

    #[tokio::test]
    async fn test_dropped_receiver_ends_subscription() {
        let transport = LocalTransport::new();
        let rx = transport.subscribe("g").await.unwrap();
        assert_eq!(transport.subscriber_count("g"), 1);

        drop(rx);
        // Give the forwarding task a chance to observe the closed receiver.
        tokio::task::yield_now().await;
        transport.publish("g", "x").await.unwrap();
        tokio::task::yield_now().await;
        transport.publish("g", "y").await.unwrap();
        assert_eq!(transport.subscriber_count("g"), 0);
    }
}
