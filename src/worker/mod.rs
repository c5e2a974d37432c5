use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::AppConfig;
use crate::db::StoreError;
use crate::models::job::JobType;
use crate::models::message::{MessageData, QueueMessage};
use crate::services::queue::{MessageQueue, QueueError, ReceivedMessage};

pub mod delivery_job;
pub mod render_job;

pub use delivery_job::DeliveryJobHandler;
pub use render_job::RenderJobHandler;

/// Pause after a queue fault before polling again.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// What a handler wants done with the message it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Outcome is recorded (success or business failure); delete the message.
    Acknowledge,
    /// Infrastructure fault; leave the message for redelivery.
    Retain,
}

/// What the dispatcher did with a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acknowledged,
    Retained,
    DeadLettered,
}

/// Faults that make a handler retain its message.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("scratch area error: {0}")]
    Scratch(#[from] std::io::Error),
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Never fails: every fault is turned into a [`Disposition`].
    async fn handle(&self, data: MessageData) -> Disposition;

    /// Called once the message is dead-lettered after `attempts` expired
    /// leases, so the record it points at does not stay in flight. Best effort.
    async fn abandon(&self, _data: &MessageData, _attempts: u32) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub receive_wait: Duration,
    pub max_receive_count: u32,
    pub item_pause: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            receive_wait: Duration::from_secs(5),
            max_receive_count: 5,
            item_pause: Duration::from_millis(50),
        }
    }
}

impl From<&AppConfig> for WorkerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            receive_wait: config.receive_wait(),
            max_receive_count: config.max_receive_count,
            item_pause: config.item_pause(),
        }
    }
}

/// Receives one message at a time and routes it by job type.
pub struct Dispatcher {
    queue: Arc<dyn MessageQueue>,
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
    receive_wait: Duration,
    max_receive_count: u32,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn MessageQueue>, settings: WorkerSettings) -> Self {
        Self {
            queue,
            handlers: HashMap::new(),
            receive_wait: settings.receive_wait,
            max_receive_count: settings.max_receive_count,
        }
    }

    pub fn register(mut self, job_type: JobType, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(job_type, handler);
        self
    }

    /// Poll until `shutdown` flips to true. The flag is checked between
    /// messages, so an in-flight job always finishes first.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        tracing::info!(handlers = self.handlers.len(), "Dispatcher started");

        while !*shutdown.borrow() {
            if let Err(e) = self.poll_once().await {
                tracing::error!(error = %e, "Queue error, backing off");
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }

        tracing::info!("Dispatcher stopped");
    }

    /// Requeue expired leases, then receive and process at most one message.
    pub async fn poll_once(&self) -> Result<Option<Settlement>, QueueError> {
        let requeued = self.queue.requeue_expired().await?;
        if requeued > 0 {
            tracing::info!(requeued, "Expired leases returned to the queue");
        }

        match self.queue.receive(self.receive_wait).await? {
            Some(message) => self.process(&message).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn process(&self, message: &ReceivedMessage) -> Result<Settlement, QueueError> {
        metrics::counter!("promo_messages_received_total").increment(1);

        let envelope: QueueMessage = match serde_json::from_str(&message.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(receipt = %message.receipt, error = %e, "Undecodable message dropped");
                return self.acknowledge(message).await;
            }
        };

        if message.attempts >= self.max_receive_count {
            tracing::error!(
                job_id = %envelope.data.job_id,
                job_type = %envelope.job_type,
                attempts = message.attempts,
                "Receive limit reached, moving message to dead letters"
            );
            self.queue.dead_letter(message).await?;
            metrics::counter!("promo_messages_dead_lettered_total").increment(1);
            if let Some(handler) = self.handler_for(&envelope) {
                handler.abandon(&envelope.data, message.attempts).await;
            }
            return Ok(Settlement::DeadLettered);
        }

        match self.route(envelope).await {
            Disposition::Acknowledge => self.acknowledge(message).await,
            Disposition::Retain => {
                metrics::counter!("promo_messages_retained_total").increment(1);
                Ok(Settlement::Retained)
            }
        }
    }

    fn handler_for(&self, envelope: &QueueMessage) -> Option<&Arc<dyn JobHandler>> {
        let job_type = envelope.job_type.parse::<JobType>().ok()?;
        self.handlers.get(&job_type)
    }

    /// Run the registered handler on its own task so a panic stays contained.
    async fn route(&self, envelope: QueueMessage) -> Disposition {
        let job_id = envelope.data.job_id;
        let Some(handler) = self.handler_for(&envelope) else {
            tracing::error!(job_id = %job_id, job_type = %envelope.job_type, "No handler for job type, dropping message");
            return Disposition::Acknowledge;
        };

        tracing::info!(job_id = %job_id, job_type = %envelope.job_type, "Dispatching job");
        let handler = Arc::clone(handler);
        match tokio::spawn(async move { handler.handle(envelope.data).await }).await {
            Ok(disposition) => disposition,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Handler crashed, retaining message");
                Disposition::Retain
            }
        }
    }

    async fn acknowledge(&self, message: &ReceivedMessage) -> Result<Settlement, QueueError> {
        self.queue.acknowledge(message).await?;
        metrics::counter!("promo_messages_acknowledged_total").increment(1);
        Ok(Settlement::Acknowledged)
    }
}
