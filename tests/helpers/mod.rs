//! In-memory doubles of every adapter the worker talks to.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use image::{Rgb, RgbImage};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use promo_pipeline::{
    app_state::AppState,
    db::{JobStore, StoreError},
    models::item::ItemSpec,
    models::job::{DeliveryState, DeliveryTarget, Job, JobStatus, JobType, ResultMap},
    models::message::QueueMessage,
    render::{assets::AssetCatalog, RenderError, Renderer},
    services::delivery::{DeliveryError, FileTransfer, TransferReport},
    services::queue::{MessageQueue, QueueError, ReceivedMessage},
    services::storage::{ArtifactStore, StorageError},
    worker::WorkerSettings,
};

fn redis_down() -> QueueError {
    QueueError::Redis(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "connection refused",
    )))
}

/// Job records kept in a map. Every call is one "committed" write.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<BTreeMap<Uuid, Job>>,
    malformed: Mutex<HashSet<Uuid>>,
    fail_saves: AtomicBool,
    /// `(status, progress)` observed after every write touching results.
    snapshots: Mutex<Vec<(JobStatus, usize)>>,
}

impl MemoryJobStore {
    pub fn insert(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }

    pub fn get(&self, job_id: Uuid) -> Job {
        self.jobs.lock().unwrap()[&job_id].clone()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }

    /// Make `load` report an undecodable payload for this job.
    pub fn corrupt(&self, job_id: Uuid) {
        self.malformed.lock().unwrap().insert(job_id);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn snapshots(&self) -> Vec<(JobStatus, usize)> {
        self.snapshots.lock().unwrap().clone()
    }

    fn update<T>(&self, job_id: Uuid, f: impl FnOnce(&mut Job) -> T) -> Result<T, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        job.updated_at = Utc::now();
        Ok(f(job))
    }

    fn snapshot(&self, job_id: Uuid) {
        let job = self.get(job_id);
        let progress = job.status_view().progress;
        self.snapshots.lock().unwrap().push((job.status, progress));
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job_type: JobType, items: Vec<ItemSpec>) -> Result<Job, StoreError> {
        let job = Job::new(job_type, items);
        self.insert(job.clone());
        Ok(job)
    }

    async fn load(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        if self.malformed.lock().unwrap().contains(&job_id) {
            return Err(StoreError::Malformed {
                job_id,
                field: "item payload",
                reason: "expected a sequence".to_string(),
            });
        }
        Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
    }

    async fn mark_running(&self, job_id: Uuid) -> Result<(), StoreError> {
        self.update(job_id, |job| {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            job.finished_at = None;
            job.message = None;
        })
    }

    async fn save_results(&self, job_id: Uuid, results: &ResultMap) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.update(job_id, |job| job.results = results.clone())?;
        self.snapshot(job_id);
        Ok(())
    }

    async fn finish(
        &self,
        job_id: Uuid,
        results: &ResultMap,
        status: JobStatus,
        message: Option<&str>,
    ) -> Result<(), StoreError> {
        self.update(job_id, |job| {
            job.results = results.clone();
            job.status = status;
            job.message = message.map(str::to_string);
            job.finished_at = Some(Utc::now());
        })?;
        self.snapshot(job_id);
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, message: &str) -> Result<(), StoreError> {
        self.update(job_id, |job| {
            job.status = JobStatus::Failed;
            job.message = Some(message.to_string());
            job.finished_at = Some(Utc::now());
        })
    }

    async fn merge_items(&self, job_id: Uuid, items: Vec<ItemSpec>) -> Result<Job, StoreError> {
        self.update(job_id, |job| {
            if job.status == JobStatus::Running {
                return Err(StoreError::Busy(job_id));
            }
            job.merge(items);
            Ok(job.clone())
        })?
    }

    async fn set_delivery(
        &self,
        job_id: Uuid,
        target: DeliveryTarget,
        state: DeliveryState,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.update(job_id, |job| {
            let delivery = job.delivery_mut(target);
            delivery.status = state;
            delivery.error = error.map(str::to_string);
        })
    }
}

#[derive(Default)]
pub struct MemoryArtifactStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failing_downloads: Mutex<HashSet<String>>,
    fail_uploads: AtomicBool,
}

impl MemoryArtifactStore {
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn put(&self, key: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
    }

    pub fn fail_download_of(&self, key: &str) {
        self.failing_downloads.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn upload(&self, key: &str, data: &[u8], _content_type: &str) -> Result<(), StorageError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Status {
                key: key.to_string(),
                code: 503,
            });
        }
        self.put(key, data);
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        if self.failing_downloads.lock().unwrap().contains(key) {
            return Err(StorageError::Status {
                key: key.to_string(),
                code: 500,
            });
        }
        self.object(key).ok_or_else(|| StorageError::Status {
            key: key.to_string(),
            code: 404,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn presigned_url(&self, key: &str, expiry_secs: u32) -> Result<String, StorageError> {
        Ok(format!("https://artifacts.test/{key}?expires={expiry_secs}"))
    }
}

/// Queue with explicit lease expiry: call [`MemoryQueue::expire_leases`] to
/// simulate a visibility timeout passing.
#[derive(Default)]
pub struct MemoryQueue {
    ready: Mutex<VecDeque<ReceivedMessage>>,
    in_flight: Mutex<Vec<ReceivedMessage>>,
    acknowledged: Mutex<Vec<ReceivedMessage>>,
    dead: Mutex<Vec<ReceivedMessage>>,
    fail_enqueue: AtomicBool,
}

impl MemoryQueue {
    /// Push a raw body as if another producer had written it.
    pub fn push_raw(&self, body: &str) {
        self.ready.lock().unwrap().push_back(ReceivedMessage {
            raw: body.to_string(),
            receipt: Uuid::new_v4(),
            attempts: 0,
            body: body.to_string(),
        });
    }

    pub fn expire_leases(&self) -> usize {
        let expired: Vec<_> = self.in_flight.lock().unwrap().drain(..).collect();
        let count = expired.len();
        let mut ready = self.ready.lock().unwrap();
        for mut message in expired {
            message.attempts += 1;
            ready.push_back(message);
        }
        count
    }

    pub fn ready_len(&self) -> usize {
        self.ready.lock().unwrap().len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    pub fn acknowledged_len(&self) -> usize {
        self.acknowledged.lock().unwrap().len()
    }

    pub fn dead_len(&self) -> usize {
        self.dead.lock().unwrap().len()
    }

    /// Decoded envelopes currently waiting, oldest first.
    pub fn pending_messages(&self) -> Vec<QueueMessage> {
        self.ready
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| serde_json::from_str(&m.body).ok())
            .collect()
    }

    pub fn fail_enqueue(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }

    fn take_in_flight(&self, message: &ReceivedMessage) -> Option<ReceivedMessage> {
        let mut in_flight = self.in_flight.lock().unwrap();
        let index = in_flight.iter().position(|m| m.receipt == message.receipt)?;
        Some(in_flight.remove(index))
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn enqueue(&self, message: &QueueMessage) -> Result<(), QueueError> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(redis_down());
        }
        self.push_raw(&serde_json::to_string(message)?);
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<ReceivedMessage>, QueueError> {
        let message = self.ready.lock().unwrap().pop_front();
        match message {
            Some(message) => {
                self.in_flight.lock().unwrap().push(message.clone());
                Ok(Some(message))
            }
            None => {
                // long-poll with nothing to hand out
                tokio::time::sleep(wait).await;
                Ok(None)
            }
        }
    }

    async fn acknowledge(&self, message: &ReceivedMessage) -> Result<(), QueueError> {
        if let Some(message) = self.take_in_flight(message) {
            self.acknowledged.lock().unwrap().push(message);
        }
        Ok(())
    }

    async fn requeue_expired(&self) -> Result<usize, QueueError> {
        Ok(0)
    }

    async fn dead_letter(&self, message: &ReceivedMessage) -> Result<(), QueueError> {
        let message = self.take_in_flight(message).unwrap_or_else(|| message.clone());
        self.dead.lock().unwrap().push(message);
        Ok(())
    }
}

/// Resolves templates against a real asset directory and paints a flat image.
pub struct FakeRenderer {
    catalog: AssetCatalog,
    rendered: Mutex<Vec<String>>,
}

impl FakeRenderer {
    pub fn new(templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog: AssetCatalog::new(templates_dir),
            rendered: Mutex::new(Vec::new()),
        }
    }

    /// Item ids rendered so far, in order.
    pub fn rendered(&self) -> Vec<String> {
        self.rendered.lock().unwrap().clone()
    }
}

impl Renderer for FakeRenderer {
    fn render(&self, spec: &ItemSpec) -> Result<RgbImage, RenderError> {
        let resolved = self.catalog.resolve(&spec.template)?;
        self.rendered.lock().unwrap().push(spec.id.clone());
        let shade = if resolved.variant { 40 } else { 200 };
        Ok(RgbImage::from_pixel(32, 16, Rgb([shade, 80, 80])))
    }
}

/// Records pushes instead of talking FTP.
#[derive(Default)]
pub struct FakeTransfer {
    configured: HashSet<DeliveryTarget>,
    rejected_files: HashSet<String>,
    session_down: AtomicBool,
    pushes: Mutex<Vec<(DeliveryTarget, Vec<String>)>>,
    pushed_paths: Mutex<Vec<PathBuf>>,
}

impl FakeTransfer {
    pub fn with_targets(targets: &[DeliveryTarget]) -> Self {
        Self {
            configured: targets.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn rejecting(mut self, filename: &str) -> Self {
        self.rejected_files.insert(filename.to_string());
        self
    }

    pub fn session_down(&self, down: bool) {
        self.session_down.store(down, Ordering::SeqCst);
    }

    pub fn pushes(&self) -> Vec<(DeliveryTarget, Vec<String>)> {
        self.pushes.lock().unwrap().clone()
    }

    /// Local paths handed to every push, in order.
    pub fn pushed_paths(&self) -> Vec<PathBuf> {
        self.pushed_paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileTransfer for FakeTransfer {
    fn is_configured(&self, target: DeliveryTarget) -> bool {
        self.configured.contains(&target)
    }

    async fn push(
        &self,
        target: DeliveryTarget,
        files: Vec<PathBuf>,
    ) -> Result<TransferReport, DeliveryError> {
        if self.session_down.load(Ordering::SeqCst) {
            return Err(DeliveryError::Connect("connection refused".to_string()));
        }

        let mut report = TransferReport::default();
        let mut names = Vec::new();
        for path in files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            assert!(path.is_file(), "pushed file {} must exist", path.display());
            self.pushed_paths.lock().unwrap().push(path.clone());
            names.push(name.clone());
            if self.rejected_files.contains(&name) {
                report.failures.push((name, "552 quota exceeded".to_string()));
            } else {
                report.uploaded.push(name);
            }
        }
        self.pushes.lock().unwrap().push((target, names));
        Ok(report)
    }
}

/// Every double plus the wiring the worker binary would build.
pub struct TestHarness {
    pub store: Arc<MemoryJobStore>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub queue: Arc<MemoryQueue>,
    pub renderer: Arc<FakeRenderer>,
    pub transfer: Arc<FakeTransfer>,
    pub templates: tempfile::TempDir,
}

impl TestHarness {
    /// Template assets present for the given file names, e.g. `template_A.jpg`.
    pub fn new(template_files: &[&str], transfer: FakeTransfer) -> Self {
        let templates = tempfile::tempdir().unwrap();
        for name in template_files {
            std::fs::write(templates.path().join(name), b"background").unwrap();
        }

        Self {
            store: Arc::new(MemoryJobStore::default()),
            artifacts: Arc::new(MemoryArtifactStore::default()),
            queue: Arc::new(MemoryQueue::default()),
            renderer: Arc::new(FakeRenderer::new(templates.path())),
            transfer: Arc::new(transfer),
            templates,
        }
    }

    pub fn add_template(&self, name: &str) {
        std::fs::write(self.templates.path().join(name), b"background").unwrap();
    }

    pub fn state(&self) -> AppState {
        AppState {
            store: self.store.clone(),
            artifacts: self.artifacts.clone(),
            queue: self.queue.clone(),
            renderer: self.renderer.clone(),
            transfer: self.transfer.clone(),
        }
    }

    pub fn settings() -> WorkerSettings {
        WorkerSettings {
            receive_wait: Duration::from_millis(10),
            max_receive_count: 3,
            item_pause: Duration::ZERO,
        }
    }
}
