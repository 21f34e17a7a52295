use std::str::FromStr as _;
use std::sync::Arc;

use caseforge_database_models::{AnalysisAggregates, AnalysisRow, JobRow, NewAnalysis};
use caseforge_domain::{AnalysisStatus, BusinessType, Depth, JobStatus};
use chrono::{DateTime, Utc};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue, Row};
use uuid::Uuid;

use crate::DbError;
use crate::traits::AnalysisRepository;

const ANALYSIS_COLUMNS: &str = "id, org_id, creator_user_id, problem_description, business_type, \
     depth, status, partial_failure, created_at, started_at, completed_at, \
     tokens_in, tokens_out, cost_usd, latency_ms";

/// Postgres-backed [`AnalysisRepository`].
pub struct PgAnalysisRepository {
    db: Arc<dyn Database>,
}

impl PgAnalysisRepository {
    /// Wraps a database connection.
    #[must_use]
    pub const fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl AnalysisRepository for PgAnalysisRepository {
    async fn create_with_job(&self, new: NewAnalysis) -> Result<(AnalysisRow, JobRow), DbError> {
        let now = Utc::now();

        self.db
            .exec_raw_params(
                "INSERT INTO analyses (
                     id, org_id, creator_user_id, problem_description, business_type,
                     depth, status, partial_failure, created_at,
                     tokens_in, tokens_out, cost_usd, latency_ms
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, $8, 0, 0, 0, 0)",
                &[
                    DatabaseValue::String(new.id.to_string()),
                    DatabaseValue::String(new.org_id.to_string()),
                    DatabaseValue::String(new.creator_user_id.to_string()),
                    DatabaseValue::String(new.problem_description.clone()),
                    DatabaseValue::String(new.business_type.to_string()),
                    DatabaseValue::String(new.depth.to_string()),
                    DatabaseValue::String(AnalysisStatus::Pending.to_string()),
                    DatabaseValue::DateTime(now.naive_utc()),
                ],
            )
            .await?;

        let job_id = Uuid::new_v4();
        self.db
            .exec_raw_params(
                "INSERT INTO jobs (
                     id, job_type, org_id, analysis_id, status, attempts, dispatched, scheduled_at
                 ) VALUES ($1, 'run_analysis', $2, $3, $4, 0, FALSE, $5)",
                &[
                    DatabaseValue::String(job_id.to_string()),
                    DatabaseValue::String(new.org_id.to_string()),
                    DatabaseValue::String(new.id.to_string()),
                    DatabaseValue::String(JobStatus::Queued.to_string()),
                    DatabaseValue::DateTime(now.naive_utc()),
                ],
            )
            .await?;

        let analysis = AnalysisRow {
            id: new.id,
            org_id: new.org_id,
            creator_user_id: new.creator_user_id,
            problem_description: new.problem_description,
            business_type: new.business_type,
            depth: new.depth,
            status: AnalysisStatus::Pending,
            partial_failure: false,
            created_at: now,
            started_at: None,
            completed_at: None,
            tokens_in: 0,
            tokens_out: 0,
            cost_usd: 0.0,
            latency_ms: 0,
        };
        let job = JobRow {
            id: job_id,
            job_type: "run_analysis".to_string(),
            org_id: new.org_id,
            analysis_id: analysis.id,
            status: JobStatus::Queued,
            attempts: 0,
            last_error: None,
            dispatched: false,
            scheduled_at: now,
        };

        Ok((analysis, job))
    }

    async fn update_status(&self, org_id: Uuid, id: Uuid, status: AnalysisStatus) -> Result<(), DbError> {
        let started_at_clause = if status == AnalysisStatus::Running {
            ", started_at = COALESCE(started_at, $3)"
        } else {
            ""
        };
        let sql = format!(
            "UPDATE analyses SET status = $3 {started_at_clause} WHERE org_id = $1 AND id = $2"
        );

        let updated = self
            .db
            .exec_raw_params(
                &sql,
                &[
                    DatabaseValue::String(org_id.to_string()),
                    DatabaseValue::String(id.to_string()),
                    DatabaseValue::String(status.to_string()),
                ],
            )
            .await?;

        if updated == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn update_aggregates(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: AnalysisStatus,
        partial_failure: bool,
        aggregates: AnalysisAggregates,
    ) -> Result<(), DbError> {
        let updated = self
            .db
            .exec_raw_params(
                "UPDATE analyses SET
                     status = $3, partial_failure = $4, completed_at = $5,
                     tokens_in = $6, tokens_out = $7, cost_usd = $8, latency_ms = $9
                 WHERE org_id = $1 AND id = $2",
                &[
                    DatabaseValue::String(org_id.to_string()),
                    DatabaseValue::String(id.to_string()),
                    DatabaseValue::String(status.to_string()),
                    DatabaseValue::Bool(partial_failure),
                    DatabaseValue::DateTime(Utc::now().naive_utc()),
                    DatabaseValue::Int64(aggregates.tokens_in),
                    DatabaseValue::Int64(aggregates.tokens_out),
                    DatabaseValue::Real64(aggregates.cost_usd),
                    DatabaseValue::Int64(aggregates.latency_ms),
                ],
            )
            .await?;

        if updated == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn get(&self, org_id: Uuid, id: Uuid) -> Result<Option<AnalysisRow>, DbError> {
        let rows = self
            .db
            .query_raw_params(
                &format!("SELECT {ANALYSIS_COLUMNS} FROM analyses WHERE org_id = $1 AND id = $2"),
                &[
                    DatabaseValue::String(org_id.to_string()),
                    DatabaseValue::String(id.to_string()),
                ],
            )
            .await?;

        rows.first().map(row_to_analysis).transpose()
    }

    async fn list(
        &self,
        org_id: Uuid,
        limit: u32,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<Vec<AnalysisRow>, DbError> {
        let rows = if let Some(cursor) = cursor {
            self.db
                .query_raw_params(
                    &format!(
                        "SELECT {ANALYSIS_COLUMNS} FROM analyses
                         WHERE org_id = $1 AND created_at < $2
                         ORDER BY created_at DESC LIMIT $3"
                    ),
                    &[
                        DatabaseValue::String(org_id.to_string()),
                        DatabaseValue::DateTime(cursor.naive_utc()),
                        DatabaseValue::Int64(i64::from(limit)),
                    ],
                )
                .await?
        } else {
            self.db
                .query_raw_params(
                    &format!(
                        "SELECT {ANALYSIS_COLUMNS} FROM analyses
                         WHERE org_id = $1
                         ORDER BY created_at DESC LIMIT $2"
                    ),
                    &[
                        DatabaseValue::String(org_id.to_string()),
                        DatabaseValue::Int64(i64::from(limit)),
                    ],
                )
                .await?
        };

        rows.iter().map(row_to_analysis).collect()
    }

    async fn find_orphaned_running(&self) -> Result<Vec<AnalysisRow>, DbError> {
        let rows = self
            .db
            .query_raw_params(
                &format!(
                    "SELECT {ANALYSIS_COLUMNS} FROM analyses a
                     WHERE a.status = $1
                       AND NOT EXISTS (
                           SELECT 1 FROM jobs j
                           WHERE j.analysis_id = a.id AND j.status IN ($2, $3)
                       )"
                ),
                &[
                    DatabaseValue::String(AnalysisStatus::Running.to_string()),
                    DatabaseValue::String(JobStatus::Queued.to_string()),
                    DatabaseValue::String(JobStatus::Running.to_string()),
                ],
            )
            .await?;

        rows.iter().map(row_to_analysis).collect()
    }

    async fn mark_failed(&self, org_id: Uuid, id: Uuid, reason: &str) -> Result<(), DbError> {
        log::warn!("marking analysis {id} failed: {reason}");
        self.update_status(org_id, id, AnalysisStatus::Failed).await
    }
}

fn row_to_analysis(row: &Row) -> Result<AnalysisRow, DbError> {
    let id: String = row.to_value("id").map_err(conv)?;
    let org_id: String = row.to_value("org_id").map_err(conv)?;
    let creator_user_id: String = row.to_value("creator_user_id").map_err(conv)?;
    let business_type: String = row.to_value("business_type").map_err(conv)?;
    let depth: String = row.to_value("depth").map_err(conv)?;
    let status: String = row.to_value("status").map_err(conv)?;
    let created_at: chrono::NaiveDateTime = row.to_value("created_at").map_err(conv)?;
    let started_at: Option<chrono::NaiveDateTime> = row.to_value("started_at").map_err(conv)?;
    let completed_at: Option<chrono::NaiveDateTime> = row.to_value("completed_at").map_err(conv)?;

    Ok(AnalysisRow {
        id: Uuid::from_str(&id).map_err(conv)?,
        org_id: Uuid::from_str(&org_id).map_err(conv)?,
        creator_user_id: Uuid::from_str(&creator_user_id).map_err(conv)?,
        problem_description: row.to_value("problem_description").map_err(conv)?,
        business_type: BusinessType::from_str(&business_type).map_err(conv)?,
        depth: Depth::from_str(&depth).map_err(conv)?,
        status: AnalysisStatus::from_str(&status).map_err(conv)?,
        partial_failure: row.to_value("partial_failure").map_err(conv)?,
        created_at: DateTime::from_naive_utc_and_offset(created_at, Utc),
        started_at: started_at.map(|t| DateTime::from_naive_utc_and_offset(t, Utc)),
        completed_at: completed_at.map(|t| DateTime::from_naive_utc_and_offset(t, Utc)),
        tokens_in: row.to_value("tokens_in").map_err(conv)?,
        tokens_out: row.to_value("tokens_out").map_err(conv)?,
        cost_usd: row.to_value("cost_usd").map_err(conv)?,
        latency_ms: row.to_value("latency_ms").map_err(conv)?,
    })
}

fn conv(e: impl std::fmt::Display) -> DbError {
    DbError::Conversion { message: e.to_string() }
}
