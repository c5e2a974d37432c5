use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Direction};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::models::message::QueueMessage;

/// Record stored in Redis around a message body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct StoredMessage {
    receipt: Uuid,
    #[serde(default)]
    attempts: u32,
    body: String,
}

/// A message handed to a worker, leased until acknowledged or expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Exact stored value, used to remove the record again.
    pub raw: String,
    pub receipt: Uuid,
    /// Earlier deliveries of this message whose lease expired.
    pub attempts: u32,
    pub body: String,
}

impl ReceivedMessage {
    /// Decode a stored record. Values not written by this client are taken as a bare body.
    pub fn from_raw(raw: String) -> Self {
        match serde_json::from_str::<StoredMessage>(&raw) {
            Ok(stored) => Self {
                receipt: stored.receipt,
                attempts: stored.attempts,
                body: stored.body,
                raw,
            },
            Err(_) => Self {
                receipt: Uuid::nil(),
                attempts: 0,
                body: raw.clone(),
                raw,
            },
        }
    }

    fn redelivered(&self) -> Result<String, QueueError> {
        let stored = StoredMessage {
            receipt: if self.receipt.is_nil() {
                Uuid::new_v4()
            } else {
                self.receipt
            },
            attempts: self.attempts + 1,
            body: self.body.clone(),
        };
        Ok(serde_json::to_string(&stored)?)
    }
}

/// Durable queue with long-poll receive and explicit acknowledgement.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn enqueue(&self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Wait at most `wait` for one message.
    async fn receive(&self, wait: Duration) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Delete a processed message.
    async fn acknowledge(&self, message: &ReceivedMessage) -> Result<(), QueueError>;

    /// Make messages whose lease expired visible again. Returns how many were moved.
    async fn requeue_expired(&self) -> Result<usize, QueueError>;

    /// Park a message that keeps failing.
    async fn dead_letter(&self, message: &ReceivedMessage) -> Result<(), QueueError>;
}

/// Redis-backed job queue with lease-based redelivery.
///
/// Keys: `<name>` (ready list), `<name>:processing` (leased records),
/// `<name>:leases` (sorted set, score = lease deadline in ms) and
/// `<name>:dead`.
pub struct RedisQueue {
    client: redis::Client,
    queue_key: String,
    processing_key: String,
    lease_key: String,
    dead_key: String,
    visibility_timeout: Duration,
}

impl RedisQueue {
    pub fn new(
        redis_url: &str,
        queue_name: &str,
        visibility_timeout: Duration,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            queue_key: queue_name.to_string(),
            processing_key: format!("{queue_name}:processing"),
            lease_key: format!("{queue_name}:leases"),
            dead_key: format!("{queue_name}:dead"),
            visibility_timeout,
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }

    /// Check Redis connectivity.
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Number of messages waiting to be received.
    pub async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(&self.queue_key).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }
}

#[async_trait]
impl MessageQueue for RedisQueue {
    async fn enqueue(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let stored = StoredMessage {
            receipt: Uuid::new_v4(),
            attempts: 0,
            body: serde_json::to_string(message)?,
        };
        let payload = serde_json::to_string(&stored)?;
        conn.lpush::<_, _, ()>(&self.queue_key, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<ReceivedMessage>, QueueError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .blmove(
                &self.queue_key,
                &self.processing_key,
                Direction::Right,
                Direction::Left,
                wait.as_secs_f64(),
            )
            .await
            .map_err(QueueError::Redis)?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let deadline = Utc::now().timestamp_millis() + self.visibility_timeout.as_millis() as i64;
        conn.zadd::<_, _, _, ()>(&self.lease_key, &raw, deadline)
            .await
            .map_err(QueueError::Redis)?;

        Ok(Some(ReceivedMessage::from_raw(raw)))
    }

    async fn acknowledge(&self, message: &ReceivedMessage) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .lrem(&self.processing_key, 1, &message.raw)
            .ignore()
            .zrem(&self.lease_key, &message.raw)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn requeue_expired(&self) -> Result<usize, QueueError> {
        let mut conn = self.connection().await?;
        let now = Utc::now().timestamp_millis();
        let expired: Vec<String> = conn
            .zrangebyscore(&self.lease_key, "-inf", now)
            .await
            .map_err(QueueError::Redis)?;

        let mut moved = 0;
        for raw in expired {
            // Whoever removes the lease owns the redelivery.
            let claimed: i64 = conn
                .zrem(&self.lease_key, &raw)
                .await
                .map_err(QueueError::Redis)?;
            if claimed == 0 {
                continue;
            }

            let message = ReceivedMessage::from_raw(raw);
            let next = message.redelivered()?;
            redis::pipe()
                .atomic()
                .lrem(&self.processing_key, 1, &message.raw)
                .ignore()
                .lpush(&self.queue_key, &next)
                .ignore()
                .query_async::<()>(&mut conn)
                .await
                .map_err(QueueError::Redis)?;

            tracing::info!(
                receipt = %message.receipt,
                attempts = message.attempts + 1,
                "Lease expired, message requeued"
            );
            moved += 1;
        }

        Ok(moved)
    }

    async fn dead_letter(&self, message: &ReceivedMessage) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .lrem(&self.processing_key, 1, &message.raw)
            .ignore()
            .zrem(&self.lease_key, &message.raw)
            .ignore()
            .lpush(&self.dead_key, &message.raw)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
