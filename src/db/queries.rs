use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{JobStore, StoreError};
use crate::models::item::ItemSpec;
use crate::models::job::{
    progress, DeliveryState, DeliveryStatus, DeliveryTarget, Job, JobStatus, JobType, ResultMap,
};

const JOB_COLUMNS: &str = r#"
    id, job_type, status, total, items, results, message,
    gold_status, gold_error, rcabinet_status, rcabinet_error,
    created_at, updated_at, started_at, finished_at
"#;

/// Job record store backed by the `promo_jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn malformed(job_id: Uuid, field: &'static str, reason: impl ToString) -> StoreError {
    StoreError::Malformed {
        job_id,
        field,
        reason: reason.to_string(),
    }
}

fn parse_delivery(
    job_id: Uuid,
    status: String,
    error: Option<String>,
) -> Result<DeliveryStatus, StoreError> {
    let status = status
        .parse::<DeliveryState>()
        .map_err(|_| malformed(job_id, "delivery status", &status))?;
    Ok(DeliveryStatus { status, error })
}

/// Map a row to a job, validating the stored payload on the way out.
fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let id: Uuid = row.try_get("id")?;

    let job_type: String = row.try_get("job_type")?;
    let job_type = job_type
        .parse::<JobType>()
        .map_err(|_| malformed(id, "job_type", &job_type))?;

    let status: String = row.try_get("status")?;
    let status = status
        .parse::<JobStatus>()
        .map_err(|_| malformed(id, "status", &status))?;

    let items: Option<Json<serde_json::Value>> = row.try_get("items")?;
    let items: Vec<ItemSpec> = match items {
        Some(Json(value)) => {
            serde_json::from_value(value).map_err(|e| malformed(id, "item payload", e))?
        }
        None => Vec::new(),
    };

    let results: Option<Json<serde_json::Value>> = row.try_get("results")?;
    let results: ResultMap = match results {
        Some(Json(value)) => match serde_json::from_value(value) {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Unreadable results map, starting from empty");
                ResultMap::new()
            }
        },
        None => ResultMap::new(),
    };

    let total: i32 = row.try_get("total")?;

    Ok(Job {
        id,
        job_type,
        status,
        total: usize::try_from(total).unwrap_or_default(),
        items,
        results,
        message: row.try_get("message")?,
        gold: parse_delivery(id, row.try_get("gold_status")?, row.try_get("gold_error")?)?,
        rcabinet: parse_delivery(
            id,
            row.try_get("rcabinet_status")?,
            row.try_get("rcabinet_error")?,
        )?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

fn delivery_columns(target: DeliveryTarget) -> (&'static str, &'static str) {
    match target {
        DeliveryTarget::Gold => ("gold_status", "gold_error"),
        DeliveryTarget::Rcabinet => ("rcabinet_status", "rcabinet_error"),
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job_type: JobType, items: Vec<ItemSpec>) -> Result<Job, StoreError> {
        let job = Job::new(job_type, items);

        sqlx::query(
            r#"
            INSERT INTO promo_jobs (id, job_type, status, total, progress, items, results, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5, '{}'::jsonb, $6, $6)
            "#,
        )
        .bind(job.id)
        .bind(job.job_type.to_string())
        .bind(job.status.to_string())
        .bind(job.total as i32)
        .bind(Json(&job.items))
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;

        Ok(job)
    }

    async fn load(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM promo_jobs WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn mark_running(&self, job_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE promo_jobs
            SET status = 'RUNNING',
                message = NULL,
                started_at = NOW(),
                finished_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(job_id));
        }
        Ok(())
    }

    async fn save_results(&self, job_id: Uuid, results: &ResultMap) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE promo_jobs
            SET results = $1, progress = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(Json(results))
        .bind(progress(results) as i32)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finish(
        &self,
        job_id: Uuid,
        results: &ResultMap,
        status: JobStatus,
        message: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE promo_jobs
            SET results = $1,
                progress = $2,
                status = $3,
                message = $4,
                finished_at = NOW(),
                updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(Json(results))
        .bind(progress(results) as i32)
        .bind(status.to_string())
        .bind(message)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, message: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE promo_jobs
            SET status = 'FAILED', message = $1, finished_at = NOW(), updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(message)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn merge_items(&self, job_id: Uuid, items: Vec<ItemSpec>) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM promo_jobs WHERE id = $1 FOR UPDATE"
        ))
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut job = match row {
            Some(row) => job_from_row(&row)?,
            None => return Err(StoreError::NotFound(job_id)),
        };

        if job.status == JobStatus::Running {
            return Err(StoreError::Busy(job_id));
        }

        job.merge(items);

        sqlx::query(
            r#"
            UPDATE promo_jobs
            SET items = $1,
                results = $2,
                total = $3,
                progress = $4,
                status = 'PENDING',
                message = NULL,
                gold_status = 'IDLE', gold_error = NULL,
                rcabinet_status = 'IDLE', rcabinet_error = NULL,
                finished_at = NULL,
                updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(Json(&job.items))
        .bind(Json(&job.results))
        .bind(job.total as i32)
        .bind(progress(&job.results) as i32)
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(job)
    }

    async fn set_delivery(
        &self,
        job_id: Uuid,
        target: DeliveryTarget,
        state: DeliveryState,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let (status_column, error_column) = delivery_columns(target);

        let result = sqlx::query(&format!(
            "UPDATE promo_jobs SET {status_column} = $1, {error_column} = $2, updated_at = NOW() WHERE id = $3"
        ))
        .bind(state.to_string())
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(job_id));
        }
        Ok(())
    }
}
