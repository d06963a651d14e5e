//! Group pub/sub transport — the process-crossing capability used to reach a
//! recipient's live sessions regardless of which process accepted them.
//!
//! A group is an opaque name (see `herald_common::types::notification_group`).
//! Publishing to a group with no subscribers is a successful no-op; the
//! persisted notification record, not the push, is the durability guarantee.

pub mod local;
pub mod redis;

use async_trait::async_trait;
use tokio::sync::mpsc;

use herald_common::error::AppError;

pub use local::LocalTransport;
pub use redis::RedisTransport;

/// Buffer size for per-subscription message channels.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Process-crossing publish/subscribe keyed by an opaque group name.
#[async_trait]
pub trait GroupTransport: Send + Sync {
    /// Deliver `payload` to every current subscriber of `group`.
    async fn publish(&self, group: &str, payload: &str) -> Result<(), AppError>;

    /// Receive every payload published to `group` after this call returns.
    ///
    /// Dropping the receiver ends the subscription.
    async fn subscribe(&self, group: &str) -> Result<mpsc::Receiver<String>, AppError>;
}
