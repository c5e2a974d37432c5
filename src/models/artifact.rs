use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::job::JobType;

/// Object-store key of a rendered artifact.
///
/// `<job-type>/<YYYYMMDD of job creation>/<job-id>/<filename>`; recomputable
/// from the job record alone.
pub fn artifact_key(
    job_type: JobType,
    created_at: DateTime<Utc>,
    job_id: Uuid,
    filename: &str,
) -> String {
    format!(
        "{}/{}/{}/{}",
        job_type,
        created_at.format("%Y%m%d"),
        job_id,
        filename
    )
}
