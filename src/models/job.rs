use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use uuid::Uuid;

use super::item::ItemSpec;

/// Overall status of a job record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl JobStatus {
    /// Every item has a terminal result and artifacts may be delivered.
    pub fn is_rendered(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::CompletedWithErrors)
    }
}

/// Kind of work a queue message points at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobType {
    PromoImage,
    PromoImageDelivery,
}

/// Processing state of a single item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ItemStatus {
    Pending,
    Processing,
    Success,
    Error,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Success | ItemStatus::Error)
    }
}

/// Outcome recorded for one item, keyed by item id in the job's results map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemResult {
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ItemResult {
    pub fn success(filename: impl Into<String>) -> Self {
        Self {
            status: ItemStatus::Success,
            filename: Some(filename.into()),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ItemStatus::Error,
            filename: None,
            message: Some(message.into()),
        }
    }
}

pub type ResultMap = BTreeMap<String, ItemResult>;

/// Number of results that reached a terminal status.
pub fn progress(results: &ResultMap) -> usize {
    results.values().filter(|r| r.status.is_terminal()).count()
}

/// COMPLETED when no result is an error, COMPLETED_WITH_ERRORS otherwise.
pub fn final_status(results: &ResultMap) -> JobStatus {
    if results.values().any(|r| r.status == ItemStatus::Error) {
        JobStatus::CompletedWithErrors
    } else {
        JobStatus::Completed
    }
}

/// Named external FTP destination.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryTarget {
    Gold,
    Rcabinet,
}

impl DeliveryTarget {
    pub const ALL: [DeliveryTarget; 2] = [DeliveryTarget::Gold, DeliveryTarget::Rcabinet];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState {
    Idle,
    Queued,
    Uploading,
    Success,
    Failed,
}

/// Delivery sub-state for one target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryStatus {
    pub status: DeliveryState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for DeliveryStatus {
    fn default() -> Self {
        Self {
            status: DeliveryState::Idle,
            error: None,
        }
    }
}

/// Durable job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub total: usize,
    pub items: Vec<ItemSpec>,
    pub results: ResultMap,
    pub message: Option<String>,
    pub gold: DeliveryStatus,
    pub rcabinet: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(job_type: JobType, items: Vec<ItemSpec>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type,
            status: JobStatus::Pending,
            total: items.len(),
            items,
            results: ResultMap::new(),
            message: None,
            gold: DeliveryStatus::default(),
            rcabinet: DeliveryStatus::default(),
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn delivery(&self, target: DeliveryTarget) -> &DeliveryStatus {
        match target {
            DeliveryTarget::Gold => &self.gold,
            DeliveryTarget::Rcabinet => &self.rcabinet,
        }
    }

    pub fn delivery_mut(&mut self, target: DeliveryTarget) -> &mut DeliveryStatus {
        match target {
            DeliveryTarget::Gold => &mut self.gold,
            DeliveryTarget::Rcabinet => &mut self.rcabinet,
        }
    }

    /// Apply a patch submission in place (replace specs by id, invalidate their results).
    pub fn merge(&mut self, incoming: Vec<ItemSpec>) {
        let (items, results) = merge_items(
            std::mem::take(&mut self.items),
            std::mem::take(&mut self.results),
            incoming,
        );
        self.items = items;
        self.results = results;
        self.total = self.items.len();
        self.status = JobStatus::Pending;
        self.message = None;
        self.gold = DeliveryStatus::default();
        self.rcabinet = DeliveryStatus::default();
        self.finished_at = None;
        self.updated_at = Utc::now();
    }

    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id,
            status: self.status,
            progress: progress(&self.results),
            total: self.total,
            results: self.results.clone(),
            start_time: self.started_at.unwrap_or(self.created_at),
            end_time: self.finished_at,
            message: self.message.clone(),
            delivery_status: DeliveryTarget::ALL
                .into_iter()
                .map(|t| (t, self.delivery(t).clone()))
                .collect(),
        }
    }
}

/// Merge incoming specs into an existing payload.
///
/// Incoming specs replace existing ones with the same id (keeping their
/// position) or are appended; results of every incoming id are dropped so
/// the item is rendered again. Untouched items keep spec and result.
pub fn merge_items(
    existing: Vec<ItemSpec>,
    mut results: ResultMap,
    incoming: Vec<ItemSpec>,
) -> (Vec<ItemSpec>, ResultMap) {
    let mut merged = existing;
    for spec in incoming {
        results.remove(&spec.id);
        match merged.iter_mut().find(|s| s.id == spec.id) {
            Some(slot) => *slot = spec,
            None => merged.push(spec),
        }
    }
    results.retain(|id, _| merged.iter().any(|s| &s.id == id));
    (merged, results)
}

/// Job record as exposed to status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: usize,
    pub total: usize,
    pub results: ResultMap,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub delivery_status: BTreeMap<DeliveryTarget, DeliveryStatus>,
}
