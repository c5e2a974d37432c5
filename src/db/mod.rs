use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::item::ItemSpec;
use crate::models::job::{DeliveryState, DeliveryTarget, Job, JobStatus, JobType, ResultMap};

pub mod queries;

pub use queries::PgJobStore;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {job_id} has an unreadable {field}: {reason}")]
    Malformed {
        job_id: Uuid,
        field: &'static str,
        reason: String,
    },

    #[error("job {0} is being rendered")]
    Busy(Uuid),
}

/// Durable job records. Every mutating call is one committed write.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a PENDING job holding the full payload.
    async fn create(&self, job_type: JobType, items: Vec<ItemSpec>) -> Result<Job, StoreError>;

    async fn load(&self, job_id: Uuid) -> Result<Option<Job>, StoreError>;

    /// RUNNING, start time set, job-level message cleared.
    async fn mark_running(&self, job_id: Uuid) -> Result<(), StoreError>;

    /// Checkpoint the results map and the derived progress count.
    async fn save_results(&self, job_id: Uuid, results: &ResultMap) -> Result<(), StoreError>;

    /// Final write of a render run: results, terminal status and end time together.
    async fn finish(
        &self,
        job_id: Uuid,
        results: &ResultMap,
        status: JobStatus,
        message: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn mark_failed(&self, job_id: Uuid, message: &str) -> Result<(), StoreError>;

    /// Patch the payload (see [`crate::models::job::merge_items`]) and reset the
    /// job to PENDING in one transaction. Rejected with [`StoreError::Busy`]
    /// while the job is RUNNING.
    async fn merge_items(&self, job_id: Uuid, items: Vec<ItemSpec>) -> Result<Job, StoreError>;

    async fn set_delivery(
        &self,
        job_id: Uuid,
        target: DeliveryTarget,
        state: DeliveryState,
        error: Option<&str>,
    ) -> Result<(), StoreError>;
}
