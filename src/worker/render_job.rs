use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::{Disposition, HandlerError, JobHandler};
use crate::db::{JobStore, StoreError};
use crate::models::artifact::artifact_key;
use crate::models::item::ItemSpec;
use crate::models::job::{final_status, ItemResult, ItemStatus, Job};
use crate::models::message::MessageData;
use crate::render::{encode_jpeg, Renderer};
use crate::services::storage::ArtifactStore;

const CONTENT_TYPE: &str = "image/jpeg";

/// Renders every unfinished item of a job and checkpoints after each one.
pub struct RenderJobHandler {
    store: Arc<dyn JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
    renderer: Arc<dyn Renderer>,
    item_pause: Duration,
}

impl RenderJobHandler {
    pub fn new(
        store: Arc<dyn JobStore>,
        artifacts: Arc<dyn ArtifactStore>,
        renderer: Arc<dyn Renderer>,
        item_pause: Duration,
    ) -> Self {
        Self {
            store,
            artifacts,
            renderer,
            item_pause,
        }
    }

    /// Record a data problem on the job. The message is dropped once that write lands.
    async fn reject(&self, job_id: Uuid, reason: &str) -> Disposition {
        tracing::error!(job_id = %job_id, reason, "Job payload rejected");
        match self.store.mark_failed(job_id, reason).await {
            Ok(()) => Disposition::Acknowledge,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to record rejection");
                Disposition::Retain
            }
        }
    }

    async fn run(&self, job_id: Uuid) -> Result<Disposition, HandlerError> {
        let job = match self.store.load(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id = %job_id, "Job not found, dropping message");
                return Ok(Disposition::Acknowledge);
            }
            Err(e @ StoreError::Malformed { .. }) => {
                return Ok(self.reject(job_id, &e.to_string()).await);
            }
            Err(e) => return Err(e.into()),
        };

        if job.items.is_empty() {
            return Ok(self.reject(job_id, "job has no items").await);
        }

        self.store.mark_running(job_id).await?;

        let mut results = job.results.clone();
        let pending: Vec<&ItemSpec> = job
            .items
            .iter()
            .filter(|spec| {
                !matches!(results.get(&spec.id), Some(r) if r.status == ItemStatus::Success)
            })
            .collect();

        tracing::info!(
            job_id = %job_id,
            total = job.total,
            pending = pending.len(),
            "Rendering job"
        );

        for (index, spec) in pending.iter().enumerate() {
            let result = self.process_item(&job, spec).await;
            let outcome = if result.status == ItemStatus::Success {
                "success"
            } else {
                "error"
            };
            metrics::counter!("promo_items_rendered_total", "outcome" => outcome).increment(1);
            results.insert(spec.id.clone(), result);

            // the last result is written together with the final status
            if index + 1 < pending.len() {
                self.store.save_results(job_id, &results).await?;
                tokio::time::sleep(self.item_pause).await;
            }
        }

        let status = final_status(&results);
        self.store.finish(job_id, &results, status, None).await?;

        tracing::info!(job_id = %job_id, status = %status, "Job finished");
        Ok(Disposition::Acknowledge)
    }

    /// Render and upload one item. Failures end up in the returned result.
    async fn process_item(&self, job: &Job, spec: &ItemSpec) -> ItemResult {
        let renderer = Arc::clone(&self.renderer);
        let owned = spec.clone();
        let rendered =
            tokio::task::spawn_blocking(move || renderer.render(&owned).and_then(|img| encode_jpeg(&img)))
                .await;

        let bytes = match rendered {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                tracing::warn!(job_id = %job.id, item_id = %spec.id, error = %e, "Render failed");
                return ItemResult::error(format!("render failed: {e}"));
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, item_id = %spec.id, error = %e, "Render task crashed");
                return ItemResult::error(format!("render crashed: {e}"));
            }
        };

        let filename = spec.output_filename();
        let key = artifact_key(job.job_type, job.created_at, job.id, &filename);
        match self.artifacts.upload(&key, &bytes, CONTENT_TYPE).await {
            Ok(()) => {
                tracing::debug!(job_id = %job.id, item_id = %spec.id, key = %key, "Artifact stored");
                ItemResult::success(filename)
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, item_id = %spec.id, error = %e, "Artifact upload failed");
                ItemResult::error(format!("artifact upload failed: {e}"))
            }
        }
    }
}

#[async_trait]
impl JobHandler for RenderJobHandler {
    async fn handle(&self, data: MessageData) -> Disposition {
        let job_id = data.job_id;
        let started = Instant::now();

        let disposition = match self.run(job_id).await {
            Ok(disposition) => disposition,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "System error while rendering");
                if let Err(write) = self
                    .store
                    .mark_failed(job_id, &format!("system error: {e}"))
                    .await
                {
                    tracing::error!(job_id = %job_id, error = %write, "Failed to record system error");
                }
                Disposition::Retain
            }
        };

        metrics::histogram!("promo_job_duration_seconds", "job_type" => "promo_image")
            .record(started.elapsed().as_secs_f64());
        disposition
    }

    async fn abandon(&self, data: &MessageData, attempts: u32) {
        let job_id = data.job_id;
        match self.store.load(job_id).await {
            Ok(Some(job)) if !job.status.is_rendered() => {}
            Ok(_) => return,
            Err(e) => tracing::warn!(job_id = %job_id, error = %e, "Abandoned job could not be loaded"),
        }
        let reason = format!("gave up after {attempts} deliveries");
        match self.store.mark_failed(job_id, &reason).await {
            Ok(()) => tracing::warn!(job_id = %job_id, attempts, "Abandoned job marked failed"),
            Err(e) => tracing::error!(job_id = %job_id, error = %e, "Failed to mark abandoned job"),
        }
    }
}
