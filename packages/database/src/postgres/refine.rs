use std::str::FromStr as _;
use std::sync::Arc;

use caseforge_database_models::{NewRefineMessage, RefineMessageRow};
use caseforge_domain::RefineRole;
use chrono::{DateTime, Utc};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue, Row};
use uuid::Uuid;

use crate::DbError;
use crate::traits::RefineRepository;

/// Postgres-backed [`RefineRepository`].
pub struct PgRefineRepository {
    db: Arc<dyn Database>,
}

impl PgRefineRepository {
    /// Wraps a database connection.
    #[must_use]
    pub const fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl RefineRepository for PgRefineRepository {
    async fn append(&self, row: NewRefineMessage) -> Result<RefineMessageRow, DbError> {
        let now = Utc::now();

        self.db
            .exec_raw_params(
                "INSERT INTO refine_messages (id, analysis_id, org_id, role, content, tokens, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    DatabaseValue::String(row.id.to_string()),
                    DatabaseValue::String(row.analysis_id.to_string()),
                    DatabaseValue::String(row.org_id.to_string()),
                    DatabaseValue::String(row.role.to_string()),
                    DatabaseValue::String(row.content.clone()),
                    DatabaseValue::Int64(row.tokens),
                    DatabaseValue::DateTime(now.naive_utc()),
                ],
            )
            .await?;

        Ok(RefineMessageRow {
            id: row.id,
            analysis_id: row.analysis_id,
            org_id: row.org_id,
            role: row.role,
            content: row.content,
            tokens: row.tokens,
            created_at: now,
        })
    }

    async fn list(&self, org_id: Uuid, analysis_id: Uuid, limit: u32) -> Result<Vec<RefineMessageRow>, DbError> {
        let rows = self
            .db
            .query_raw_params(
                "SELECT id, analysis_id, org_id, role, content, tokens, created_at
                 FROM refine_messages
                 WHERE org_id = $1 AND analysis_id = $2
                 ORDER BY created_at ASC LIMIT $3",
                &[
                    DatabaseValue::String(org_id.to_string()),
                    DatabaseValue::String(analysis_id.to_string()),
                    DatabaseValue::Int64(i64::from(limit)),
                ],
            )
            .await?;

        rows.iter().map(row_to_message).collect()
    }
}

fn row_to_message(row: &Row) -> Result<RefineMessageRow, DbError> {
    let id: String = row.to_value("id").map_err(conv)?;
    let analysis_id: String = row.to_value("analysis_id").map_err(conv)?;
    let org_id: String = row.to_value("org_id").map_err(conv)?;
    let role: String = row.to_value("role").map_err(conv)?;
    let created_at: chrono::NaiveDateTime = row.to_value("created_at").map_err(conv)?;

    Ok(RefineMessageRow {
        id: Uuid::from_str(&id).map_err(conv)?,
        analysis_id: Uuid::from_str(&analysis_id).map_err(conv)?,
        org_id: Uuid::from_str(&org_id).map_err(conv)?,
        role: RefineRole::from_str(&role).map_err(conv)?,
        content: row.to_value("content").map_err(conv)?,
        tokens: row.to_value("tokens").map_err(conv)?,
        created_at: DateTime::from_naive_utc_and_offset(created_at, Utc),
    })
}

fn conv(e: impl std::fmt::Display) -> DbError {
    DbError::Conversion { message: e.to_string() }
}
