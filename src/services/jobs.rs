use garde::Validate;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::Arc;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::db::{JobStore, StoreError};
use crate::models::artifact::artifact_key;
use crate::models::item::{ItemSpec, ItemSpecInput};
use crate::models::job::{
    DeliveryState, DeliveryTarget, ItemStatus, Job, JobStatusView, JobType,
};
use crate::models::message::QueueMessage;
use crate::services::queue::{MessageQueue, QueueError};
use crate::services::storage::{ArtifactStore, StorageError};

/// Returned by job submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub total: usize,
}

/// Producer-side operations: submit, patch, inspect and deliver jobs.
pub struct JobService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn MessageQueue>,
    artifacts: Arc<dyn ArtifactStore>,
    presign_expiry_secs: u32,
}

impl JobService {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn MessageQueue>,
        artifacts: Arc<dyn ArtifactStore>,
        presign_expiry_secs: u32,
    ) -> Self {
        Self {
            store,
            queue,
            artifacts,
            presign_expiry_secs,
        }
    }

    /// Store a PENDING job with the full payload and enqueue its pointer message.
    pub async fn create_job(
        &self,
        items: Vec<ItemSpecInput>,
    ) -> Result<JobAccepted, JobServiceError> {
        let items = validate_items(items)?;
        let job = self.store.create(JobType::PromoImage, items).await?;
        tracing::info!(job_id = %job.id, total = job.total, "Job created");

        self.enqueue_render(&job).await?;
        Ok(JobAccepted {
            job_id: job.id,
            total: job.total,
        })
    }

    /// Merge a subset of items into an existing job and re-enqueue it.
    pub async fn patch_job(
        &self,
        job_id: Uuid,
        items: Vec<ItemSpecInput>,
    ) -> Result<JobAccepted, JobServiceError> {
        let items = validate_items(items)?;
        let incoming = items.len();
        let job = self
            .store
            .merge_items(job_id, items)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(id) => JobServiceError::NotFound(format!("job {id}")),
                StoreError::Busy(id) => JobServiceError::Busy(id),
                other => JobServiceError::Store(other),
            })?;
        tracing::info!(job_id = %job.id, incoming, total = job.total, "Job merged");

        self.enqueue_render(&job).await?;
        Ok(JobAccepted {
            job_id: job.id,
            total: job.total,
        })
    }

    pub async fn status(&self, job_id: Uuid) -> Result<JobStatusView, JobServiceError> {
        Ok(self.load(job_id).await?.status_view())
    }

    /// Presigned link to the artifact of one successful item.
    pub async fn artifact_link(
        &self,
        job_id: Uuid,
        item_id: &str,
    ) -> Result<String, JobServiceError> {
        let job = self.load(job_id).await?;
        let filename = job
            .results
            .get(item_id)
            .filter(|r| r.status == ItemStatus::Success)
            .and_then(|r| r.filename.as_deref())
            .ok_or_else(|| JobServiceError::NotFound(format!("artifact of item {item_id}")))?;

        let key = artifact_key(job.job_type, job.created_at, job.id, filename);
        Ok(self
            .artifacts
            .presigned_url(&key, self.presign_expiry_secs)
            .await?)
    }

    /// Zip archive of every successful artifact, in results order.
    pub async fn bundle(&self, job_id: Uuid) -> Result<Vec<u8>, JobServiceError> {
        let job = self.load(job_id).await?;
        let filenames = success_filenames(&job);
        if filenames.is_empty() {
            return Err(JobServiceError::NotFound(format!("artifacts of job {job_id}")));
        }

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for filename in filenames {
            let key = artifact_key(job.job_type, job.created_at, job.id, &filename);
            let bytes = self.artifacts.download(&key).await?;
            writer.start_file(filename.as_str(), options)?;
            writer.write_all(&bytes).map_err(zip::result::ZipError::from)?;
        }

        Ok(writer.finish()?.into_inner())
    }

    /// Queue delivery of a rendered job's artifacts to one target.
    pub async fn trigger_delivery(
        &self,
        job_id: Uuid,
        target: DeliveryTarget,
    ) -> Result<(), JobServiceError> {
        let job = self.load(job_id).await?;
        if !job.status.is_rendered() {
            return Err(JobServiceError::Validation(format!(
                "job {job_id} is {} and cannot be delivered",
                job.status
            )));
        }

        self.store
            .set_delivery(job_id, target, DeliveryState::Queued, None)
            .await?;

        if let Err(e) = self
            .queue
            .enqueue(&QueueMessage::delivery(job_id, target))
            .await
        {
            let reason = format!("could not enqueue delivery: {e}");
            if let Err(write) = self
                .store
                .set_delivery(job_id, target, DeliveryState::Failed, Some(&reason))
                .await
            {
                tracing::error!(job_id = %job_id, error = %write, "Failed to record delivery failure");
            }
            return Err(e.into());
        }

        tracing::info!(job_id = %job_id, target = %target, "Delivery queued");
        Ok(())
    }

    async fn load(&self, job_id: Uuid) -> Result<Job, JobServiceError> {
        self.store
            .load(job_id)
            .await?
            .ok_or_else(|| JobServiceError::NotFound(format!("job {job_id}")))
    }

    async fn enqueue_render(&self, job: &Job) -> Result<(), JobServiceError> {
        if let Err(e) = self.queue.enqueue(&QueueMessage::render(job.id)).await {
            let reason = format!("could not enqueue job: {e}");
            if let Err(write) = self.store.mark_failed(job.id, &reason).await {
                tracing::error!(job_id = %job.id, error = %write, "Failed to record enqueue failure");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

fn success_filenames(job: &Job) -> Vec<String> {
    job.results
        .values()
        .filter(|r| r.status == ItemStatus::Success)
        .filter_map(|r| r.filename.clone())
        .collect()
}

/// Validate a submission and convert it to stored specs.
pub fn validate_items(inputs: Vec<ItemSpecInput>) -> Result<Vec<ItemSpec>, JobServiceError> {
    if inputs.is_empty() {
        return Err(JobServiceError::Validation("no items submitted".to_string()));
    }

    let mut seen = HashSet::new();
    let mut specs = Vec::with_capacity(inputs.len());
    for (index, input) in inputs.into_iter().enumerate() {
        input
            .validate()
            .map_err(|report| JobServiceError::Validation(format!("item {index}: {report}")))?;
        if !seen.insert(input.id.clone()) {
            return Err(JobServiceError::Validation(format!(
                "item {index}: duplicate id {}",
                input.id
            )));
        }

        let spec = ItemSpec::from(input);
        if spec.template.base.is_empty() {
            return Err(JobServiceError::Validation(format!(
                "item {index}: empty template name"
            )));
        }
        specs.push(spec);
    }
    Ok(specs)
}

#[derive(Debug, thiserror::Error)]
pub enum JobServiceError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Job {0} is being rendered")]
    Busy(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Bundle error: {0}")]
    Bundle(#[from] zip::result::ZipError),
}
