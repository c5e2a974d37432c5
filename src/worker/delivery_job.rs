use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::{Disposition, HandlerError, JobHandler};
use crate::db::{JobStore, StoreError};
use crate::models::artifact::artifact_key;
use crate::models::job::{DeliveryState, DeliveryTarget, ItemStatus, Job};
use crate::models::message::MessageData;
use crate::services::delivery::FileTransfer;
use crate::services::storage::ArtifactStore;

/// Pushes the successful artifacts of a rendered job to one delivery target.
pub struct DeliveryJobHandler {
    store: Arc<dyn JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
    transfer: Arc<dyn FileTransfer>,
}

/// Summary line for a partly failed delivery.
fn failure_summary(failed: &[(String, String)], total: usize) -> Option<String> {
    let (name, error) = failed.first()?;
    Some(format!(
        "{} of {} files failed; first error: {}: {}",
        failed.len(),
        total,
        name,
        error
    ))
}

impl DeliveryJobHandler {
    pub fn new(
        store: Arc<dyn JobStore>,
        artifacts: Arc<dyn ArtifactStore>,
        transfer: Arc<dyn FileTransfer>,
    ) -> Self {
        Self {
            store,
            artifacts,
            transfer,
        }
    }

    async fn settle(
        &self,
        job_id: Uuid,
        target: DeliveryTarget,
        state: DeliveryState,
        error: Option<&str>,
    ) -> Result<Disposition, HandlerError> {
        self.store.set_delivery(job_id, target, state, error).await?;
        let outcome = if state == DeliveryState::Success {
            "success"
        } else {
            "failed"
        };
        metrics::counter!(
            "promo_deliveries_total",
            "target" => target.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        Ok(Disposition::Acknowledge)
    }

    async fn reject(
        &self,
        job_id: Uuid,
        target: DeliveryTarget,
        reason: &str,
    ) -> Result<Disposition, HandlerError> {
        tracing::warn!(job_id = %job_id, target = %target, reason, "Delivery rejected");
        self.settle(job_id, target, DeliveryState::Failed, Some(reason))
            .await
    }

    async fn run(&self, job_id: Uuid, target: DeliveryTarget) -> Result<Disposition, HandlerError> {
        let job = match self.store.load(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id = %job_id, "Job not found, dropping delivery");
                return Ok(Disposition::Acknowledge);
            }
            Err(e @ StoreError::Malformed { .. }) => {
                return self.reject(job_id, target, &e.to_string()).await;
            }
            Err(e) => return Err(e.into()),
        };

        if !self.transfer.is_configured(target) {
            return self
                .reject(job_id, target, &format!("no delivery profile configured for {target}"))
                .await;
        }
        if !job.status.is_rendered() {
            return self
                .reject(
                    job_id,
                    target,
                    &format!("job is {} and has not finished rendering", job.status),
                )
                .await;
        }

        let files = success_files(&job);
        if files.is_empty() {
            tracing::info!(job_id = %job_id, target = %target, "Nothing to deliver");
            return self.settle(job_id, target, DeliveryState::Success, None).await;
        }

        self.store
            .set_delivery(job_id, target, DeliveryState::Uploading, None)
            .await?;
        tracing::info!(job_id = %job_id, target = %target, files = files.len(), "Delivery started");

        let scratch = tempfile::Builder::new()
            .prefix(&format!("delivery-{job_id}-{target}-"))
            .tempdir()?;

        let mut failed: Vec<(String, String)> = Vec::new();
        let mut local: Vec<PathBuf> = Vec::with_capacity(files.len());
        for filename in &files {
            let key = artifact_key(job.job_type, job.created_at, job.id, filename);
            let bytes = match self.artifacts.download(&key).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(job_id = %job_id, key = %key, error = %e, "Artifact download failed");
                    failed.push((filename.clone(), format!("download failed: {e}")));
                    continue;
                }
            };
            // only the base name is ever joined onto the scratch dir
            let Some(name) = Path::new(filename).file_name() else {
                failed.push((filename.clone(), "invalid artifact name".to_string()));
                continue;
            };
            let path = scratch.path().join(name);
            match tokio::fs::write(&path, &bytes).await {
                Ok(()) => local.push(path),
                Err(e) => failed.push((filename.clone(), format!("scratch write failed: {e}"))),
            }
        }

        if !local.is_empty() {
            match self.transfer.push(target, local).await {
                Ok(report) => failed.extend(report.failures),
                Err(e) => {
                    let reason = format!("delivery to {target} failed: {e}");
                    return self
                        .settle(job_id, target, DeliveryState::Failed, Some(&reason))
                        .await;
                }
            }
        }

        match failure_summary(&failed, files.len()) {
            None => {
                tracing::info!(job_id = %job_id, target = %target, files = files.len(), "Delivery complete");
                self.settle(job_id, target, DeliveryState::Success, None).await
            }
            Some(summary) => {
                tracing::warn!(job_id = %job_id, target = %target, %summary, "Delivery incomplete");
                self.settle(job_id, target, DeliveryState::Failed, Some(&summary))
                    .await
            }
        }
    }
}

/// Artifact names of every Success result, in results order.
fn success_files(job: &Job) -> Vec<String> {
    job.results
        .values()
        .filter(|r| r.status == ItemStatus::Success)
        .filter_map(|r| r.filename.clone())
        .collect()
}

#[async_trait]
impl JobHandler for DeliveryJobHandler {
    async fn handle(&self, data: MessageData) -> Disposition {
        let job_id = data.job_id;
        let target = match data.target.as_deref().map(str::parse::<DeliveryTarget>) {
            Some(Ok(target)) => target,
            _ => {
                tracing::error!(job_id = %job_id, target = ?data.target, "Missing or unknown delivery target, dropping message");
                return Disposition::Acknowledge;
            }
        };
        let started = Instant::now();

        let disposition = match self.run(job_id, target).await {
            Ok(disposition) => disposition,
            Err(e) => {
                tracing::error!(job_id = %job_id, target = %target, error = %e, "System error while delivering");
                let reason = format!("system error: {e}");
                if let Err(write) = self
                    .store
                    .set_delivery(job_id, target, DeliveryState::Failed, Some(&reason))
                    .await
                {
                    tracing::error!(job_id = %job_id, error = %write, "Failed to record delivery error");
                }
                Disposition::Retain
            }
        };

        metrics::histogram!("promo_job_duration_seconds", "job_type" => "promo_image_delivery")
            .record(started.elapsed().as_secs_f64());
        disposition
    }

    async fn abandon(&self, data: &MessageData, attempts: u32) {
        let Some(Ok(target)) = data.target.as_deref().map(str::parse::<DeliveryTarget>) else {
            return;
        };
        let job_id = data.job_id;
        let reason = format!("gave up after {attempts} deliveries");
        if let Err(e) = self
            .store
            .set_delivery(job_id, target, DeliveryState::Failed, Some(&reason))
            .await
        {
            tracing::error!(job_id = %job_id, target = %target, error = %e, "Failed to mark abandoned delivery");
        }
    }
}
