//! At-least-once job queue between the HTTP surface and the GPU worker.
//!
//! Producers [`send`](JobQueue::send) opaque message bodies. The consumer
//! [`receive`](JobQueue::receive)s one message at a time; a received message
//! is leased, not removed, and only disappears once the consumer
//! [`complete`](JobQueue::complete)s it. A message whose lease runs out
//! (consumer crash) or that is [`abandon`](JobQueue::abandon)ed becomes
//! visible again and is redelivered with a higher `delivery_count`.

mod sqlite;

pub use sqlite::{SqliteQueue, DEFAULT_LEASE, DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_BACKOFF};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue store error: {0}")]
    Store(#[from] reconn_db::DbError),

    #[error("queue task failed: {0}")]
    Task(String),
}

/// One leased delivery of a queued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: i64,
    pub body: Vec<u8>,
    /// How many times this message has been handed out, this delivery included.
    pub delivery_count: u32,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues a message body, returning its id.
    async fn send(&self, body: &[u8]) -> Result<i64, QueueError>;

    /// Waits until a message is visible and leases it.
    async fn receive(&self) -> Result<QueueMessage, QueueError>;

    /// Acknowledges a message, removing it for good.
    async fn complete(&self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Releases a lease early so the message is redelivered after a backoff.
    async fn abandon(&self, message: &QueueMessage) -> Result<(), QueueError>;
}
