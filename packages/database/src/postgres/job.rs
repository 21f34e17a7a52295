use std::str::FromStr as _;
use std::sync::Arc;

use caseforge_database_models::JobRow;
use caseforge_domain::JobStatus;
use chrono::{DateTime, Utc};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue, Row};
use uuid::Uuid;

use crate::DbError;
use crate::traits::JobRepository;

const JOB_COLUMNS: &str = "id, job_type, org_id, analysis_id, status, attempts, last_error, dispatched, scheduled_at";

/// Postgres-backed [`JobRepository`].
pub struct PgJobRepository {
    db: Arc<dyn Database>,
}

impl PgJobRepository {
    /// Wraps a database connection.
    #[must_use]
    pub const fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl JobRepository for PgJobRepository {
    async fn get(&self, job_id: Uuid) -> Result<Option<JobRow>, DbError> {
        let rows = self
            .db
            .query_raw_params(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"),
                &[DatabaseValue::String(job_id.to_string())],
            )
            .await?;

        rows.first().map(row_to_job).transpose()
    }

    async fn list_undispatched(&self, limit: u32) -> Result<Vec<JobRow>, DbError> {
        let rows = self
            .db
            .query_raw_params(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM jobs
                     WHERE dispatched = FALSE AND status = $1
                     ORDER BY scheduled_at ASC LIMIT $2"
                ),
                &[
                    DatabaseValue::String(JobStatus::Queued.to_string()),
                    DatabaseValue::Int64(i64::from(limit)),
                ],
            )
            .await?;

        rows.iter().map(row_to_job).collect()
    }

    async fn mark_dispatched(&self, job_id: Uuid) -> Result<(), DbError> {
        let updated = self
            .db
            .exec_raw_params(
                "UPDATE jobs SET dispatched = TRUE WHERE id = $1",
                &[DatabaseValue::String(job_id.to_string())],
            )
            .await?;

        if updated == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn update_status(&self, job_id: Uuid, status: JobStatus, last_error: Option<&str>) -> Result<(), DbError> {
        let updated = self
            .db
            .exec_raw_params(
                "UPDATE jobs SET status = $2, last_error = $3 WHERE id = $1",
                &[
                    DatabaseValue::String(job_id.to_string()),
                    DatabaseValue::String(status.to_string()),
                    last_error.map_or(DatabaseValue::Null, |e| DatabaseValue::String(e.to_string())),
                ],
            )
            .await?;

        if updated == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn increment_attempts(&self, job_id: Uuid) -> Result<i32, DbError> {
        let rows = self
            .db
            .query_raw_params(
                "UPDATE jobs SET attempts = attempts + 1 WHERE id = $1 RETURNING attempts",
                &[DatabaseValue::String(job_id.to_string())],
            )
            .await?;

        let row = rows.first().ok_or(DbError::NotFound)?;
        row.to_value("attempts").map_err(conv)
    }
}

fn row_to_job(row: &Row) -> Result<JobRow, DbError> {
    let id: String = row.to_value("id").map_err(conv)?;
    let org_id: String = row.to_value("org_id").map_err(conv)?;
    let analysis_id: String = row.to_value("analysis_id").map_err(conv)?;
    let status: String = row.to_value("status").map_err(conv)?;
    let scheduled_at: chrono::NaiveDateTime = row.to_value("scheduled_at").map_err(conv)?;

    Ok(JobRow {
        id: Uuid::from_str(&id).map_err(conv)?,
        job_type: row.to_value("job_type").map_err(conv)?,
        org_id: Uuid::from_str(&org_id).map_err(conv)?,
        analysis_id: Uuid::from_str(&analysis_id).map_err(conv)?,
        status: JobStatus::from_str(&status).map_err(conv)?,
        attempts: row.to_value("attempts").map_err(conv)?,
        last_error: row.to_value("last_error").map_err(conv)?,
        dispatched: row.to_value("dispatched").map_err(conv)?,
        scheduled_at: DateTime::from_naive_utc_and_offset(scheduled_at, Utc),
    })
}

fn conv(e: impl std::fmt::Display) -> DbError {
    DbError::Conversion { message: e.to_string() }
}
