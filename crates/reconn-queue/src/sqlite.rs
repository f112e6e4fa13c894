use crate::{JobQueue, QueueError, QueueMessage};
use async_trait::async_trait;
use chrono::Utc;
use reconn_db::{DbError, DbPool};
use rusqlite::{params, OptionalExtension};
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_LEASE: Duration = Duration::from_secs(600);
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// [`JobQueue`] stored in the `gpu_task_queue` table of the row store.
///
/// `visible_at` holds epoch milliseconds; a message is deliverable once
/// `visible_at <= now`. Claiming a message pushes `visible_at` one lease
/// into the future inside a single `UPDATE … RETURNING`, so two consumers
/// never lease the same delivery. An abandoned message stays hidden for
/// `retry_backoff` times its delivery count.
#[derive(Clone)]
pub struct SqliteQueue {
    pool: DbPool,
    poll_interval: Duration,
    lease: Duration,
    retry_backoff: Duration,
}

impl SqliteQueue {
    pub fn new(pool: DbPool) -> Self {
        Self::with_timing(pool, DEFAULT_POLL_INTERVAL, DEFAULT_LEASE)
    }

    pub fn with_timing(pool: DbPool, poll_interval: Duration, lease: Duration) -> Self {
        Self {
            pool,
            poll_interval,
            lease,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    /// Leases the oldest visible message, if any, without waiting.
    pub async fn try_receive(&self) -> Result<Option<QueueMessage>, QueueError> {
        let pool = self.pool.clone();
        let lease_ms = i64::try_from(self.lease.as_millis()).unwrap_or(i64::MAX);
        run(move || {
            let conn = pool.get()?;
            let now = Utc::now().timestamp_millis();
            let message = conn
                .query_row(
                    "UPDATE gpu_task_queue
                     SET visible_at = ?2, delivery_count = delivery_count + 1
                     WHERE id = (
                         SELECT id FROM gpu_task_queue
                         WHERE visible_at <= ?1
                         ORDER BY id
                         LIMIT 1
                     )
                     RETURNING id, body, delivery_count",
                    params![now, now.saturating_add(lease_ms)],
                    |row| {
                        Ok(QueueMessage {
                            id: row.get(0)?,
                            body: row.get(1)?,
                            delivery_count: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(message)
        })
        .await
    }

    /// Number of messages in the queue, leased or not.
    pub async fn len(&self) -> Result<u64, QueueError> {
        let pool = self.pool.clone();
        run(move || {
            let conn = pool.get()?;
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM gpu_task_queue", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }
}

async fn run<T, F>(f: F) -> Result<T, QueueError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DbError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| QueueError::Task(e.to_string()))?
        .map_err(QueueError::from)
}

#[async_trait]
impl JobQueue for SqliteQueue {
    async fn send(&self, body: &[u8]) -> Result<i64, QueueError> {
        let pool = self.pool.clone();
        let body = body.to_vec();
        let id = run(move || {
            let conn = pool.get()?;
            conn.execute(
                "INSERT INTO gpu_task_queue (body, visible_at) VALUES (?1, ?2)",
                params![body, Utc::now().timestamp_millis()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await?;
        tracing::debug!(message_id = id, "message enqueued");
        Ok(id)
    }

    async fn receive(&self) -> Result<QueueMessage, QueueError> {
        loop {
            if let Some(message) = self.try_receive().await? {
                tracing::debug!(
                    message_id = message.id,
                    delivery_count = message.delivery_count,
                    "message leased"
                );
                return Ok(message);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn complete(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let pool = self.pool.clone();
        let id = message.id;
        let removed = run(move || {
            let conn = pool.get()?;
            Ok(conn.execute("DELETE FROM gpu_task_queue WHERE id = ?1", params![id])?)
        })
        .await?;
        if removed == 0 {
            tracing::warn!(message_id = id, "completed message was already gone");
        }
        Ok(())
    }

    async fn abandon(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let pool = self.pool.clone();
        let (id, delivery_count) = (message.id, message.delivery_count);
        let backoff_ms = i64::try_from(self.retry_backoff.as_millis())
            .unwrap_or(i64::MAX)
            .saturating_mul(i64::from(delivery_count.max(1)));
        run(move || {
            let conn = pool.get()?;
            let visible_at = Utc::now().timestamp_millis().saturating_add(backoff_ms);
            // Only release our own lease; a newer delivery owns the row otherwise.
            conn.execute(
                "UPDATE gpu_task_queue SET visible_at = ?3
                 WHERE id = ?1 AND delivery_count = ?2",
                params![id, delivery_count, visible_at],
            )?;
            Ok(())
        })
        .await?;
        tracing::debug!(message_id = id, delay_ms = backoff_ms, "message abandoned");
        Ok(())
    }
}
