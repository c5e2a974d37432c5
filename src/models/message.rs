use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{DeliveryTarget, JobType};

/// Pointer message placed on the queue. Never carries the item payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueMessage {
    /// Kept as text so an unknown type can be reported and dropped by the dispatcher.
    pub job_type: String,
    pub data: MessageData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageData {
    pub job_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl QueueMessage {
    pub fn render(job_id: Uuid) -> Self {
        Self {
            job_type: JobType::PromoImage.to_string(),
            data: MessageData {
                job_id,
                target: None,
            },
        }
    }

    pub fn delivery(job_id: Uuid, target: DeliveryTarget) -> Self {
        Self {
            job_type: JobType::PromoImageDelivery.to_string(),
            data: MessageData {
                job_id,
                target: Some(target.to_string()),
            },
        }
    }
}
