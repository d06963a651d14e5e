//! Redis-backed group transport.
//!
//! Publishes through a shared `ConnectionManager`; each subscription opens a
//! dedicated pub/sub connection and forwards messages into an mpsc channel
//! from a spawned task. The task exits when the subscriber side is dropped,
//! closing the pub/sub connection with it.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use tokio::sync::mpsc;

use herald_common::error::AppError;

use crate::{GroupTransport, SUBSCRIPTION_BUFFER};

pub struct RedisTransport {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl RedisTransport {
    /// `publisher` is the shared connection used for PUBLISH; `client` is
    /// reused to open per-subscription pub/sub connections.
    pub fn new(client: redis::Client, publisher: ConnectionManager) -> Self {
        Self { client, publisher }
    }

    pub async fn connect(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)?;
        let publisher = ConnectionManager::new(client.clone()).await?;

        tracing::info!("Connected to Redis");
        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl GroupTransport for RedisTransport {
    async fn publish(&self, group: &str, payload: &str) -> Result<(), AppError> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(group)
            .arg(payload)
            .query_async(&mut conn)
            .await?;

        tracing::debug!(group, receivers, "Published to group");
        Ok(())
    }

    async fn subscribe(&self, group: &str) -> Result<mpsc::Receiver<String>, AppError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(group).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let group = group.to_string();

        tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            loop {
                tokio::select! {
                    maybe = messages.next() => {
                        let Some(msg) = maybe else {
                            break;
                        };
                        let payload: String = match msg.get_payload() {
                            Ok(p) => p,
                            Err(e) => {
                                tracing::warn!(group, error = %e, "Dropping undecodable pub/sub payload");
                                continue;
                            }
                        };
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    // Receiver dropped means the subscription ended; dropping
                    // the pub/sub connection unsubscribes the group.
                    _ = tx.closed() => break,
                }
            }
            tracing::debug!(group, "Group subscription closed");
        });

        Ok(rx)
    }
}
