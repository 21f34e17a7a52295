use std::str::FromStr as _;
use std::sync::Arc;

use caseforge_database_models::{AgentOutputRow, NewAgentOutput};
use caseforge_domain::{AgentName, AgentStatus};
use chrono::{DateTime, Utc};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue, Row};
use uuid::Uuid;

use crate::DbError;
use crate::traits::AgentOutputRepository;

/// Postgres-backed [`AgentOutputRepository`].
pub struct PgAgentOutputRepository {
    db: Arc<dyn Database>,
}

impl PgAgentOutputRepository {
    /// Wraps a database connection.
    #[must_use]
    pub const fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl AgentOutputRepository for PgAgentOutputRepository {
    async fn upsert(&self, analysis_id: Uuid, agent_name: AgentName, row: NewAgentOutput) -> Result<(), DbError> {
        self.db
            .exec_raw_params(
                "INSERT INTO agent_outputs (
                     analysis_id, agent_name, output_text, status, tokens_in, tokens_out,
                     cost_usd, latency_ms, error, started_at, completed_at
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                 ON CONFLICT (analysis_id, agent_name) DO UPDATE SET
                     output_text = EXCLUDED.output_text,
                     status = EXCLUDED.status,
                     tokens_in = EXCLUDED.tokens_in,
                     tokens_out = EXCLUDED.tokens_out,
                     cost_usd = EXCLUDED.cost_usd,
                     latency_ms = EXCLUDED.latency_ms,
                     error = EXCLUDED.error,
                     started_at = EXCLUDED.started_at,
                     completed_at = EXCLUDED.completed_at",
                &[
                    DatabaseValue::String(analysis_id.to_string()),
                    DatabaseValue::String(agent_name.to_string()),
                    DatabaseValue::String(row.output_text),
                    DatabaseValue::String(row.status.to_string()),
                    DatabaseValue::Int64(row.tokens_in),
                    DatabaseValue::Int64(row.tokens_out),
                    DatabaseValue::Real64(row.cost_usd),
                    DatabaseValue::Int64(row.latency_ms),
                    row.error.map_or(DatabaseValue::Null, DatabaseValue::String),
                    row.started_at.map_or(DatabaseValue::Null, |t| DatabaseValue::DateTime(t.naive_utc())),
                    row.completed_at.map_or(DatabaseValue::Null, |t| DatabaseValue::DateTime(t.naive_utc())),
                ],
            )
            .await?;

        Ok(())
    }

    async fn list(&self, analysis_id: Uuid) -> Result<Vec<AgentOutputRow>, DbError> {
        let rows = self
            .db
            .query_raw_params(
                "SELECT analysis_id, agent_name, output_text, status, tokens_in, tokens_out,
                        cost_usd, latency_ms, error, started_at, completed_at
                 FROM agent_outputs WHERE analysis_id = $1",
                &[DatabaseValue::String(analysis_id.to_string())],
            )
            .await?;

        rows.iter().map(row_to_agent_output).collect()
    }
}

fn row_to_agent_output(row: &Row) -> Result<AgentOutputRow, DbError> {
    let analysis_id: String = row.to_value("analysis_id").map_err(conv)?;
    let agent_name: String = row.to_value("agent_name").map_err(conv)?;
    let status: String = row.to_value("status").map_err(conv)?;
    let started_at: Option<chrono::NaiveDateTime> = row.to_value("started_at").map_err(conv)?;
    let completed_at: Option<chrono::NaiveDateTime> = row.to_value("completed_at").map_err(conv)?;

    Ok(AgentOutputRow {
        analysis_id: Uuid::from_str(&analysis_id).map_err(conv)?,
        agent_name: AgentName::from_str(&agent_name).map_err(conv)?,
        output_text: row.to_value("output_text").map_err(conv)?,
        status: AgentStatus::from_str(&status).map_err(conv)?,
        tokens_in: row.to_value("tokens_in").map_err(conv)?,
        tokens_out: row.to_value("tokens_out").map_err(conv)?,
        cost_usd: row.to_value("cost_usd").map_err(conv)?,
        latency_ms: row.to_value("latency_ms").map_err(conv)?,
        error: row.to_value("error").map_err(conv)?,
        started_at: started_at.map(|t| DateTime::from_naive_utc_and_offset(t, Utc)),
        completed_at: completed_at.map(|t| DateTime::from_naive_utc_and_offset(t, Utc)),
    })
}

fn conv(e: impl std::fmt::Display) -> DbError {
    DbError::Conversion { message: e.to_string() }
}
