#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the business analysis server.
//!
//! These are separate from the database row types (`caseforge_database_models`)
//! so the wire contract can evolve independently of storage.

use caseforge_database_models::{AgentOutputRow, AnalysisRow};
use caseforge_domain::{AgentName, AgentStatus, AnalysisStatus, BusinessType, Depth, Limit, Plan};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `POST /auth/register` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Email, normalized to lowercase before use.
    pub email: String,
    /// Plaintext password; validated against the §6 rules before hashing.
    pub password: String,
    /// Display name for the new organization.
    pub org_name: String,
}

/// `POST /auth/login` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Email, normalized to lowercase before lookup.
    pub email: String,
    /// Plaintext password, checked with a constant-time comparison.
    pub password: String,
}

/// `POST /auth/refresh` request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    /// A previously issued, unexpired refresh token.
    pub refresh_token: String,
}

/// Response shared by `/auth/register` and `/auth/login`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairResponse {
    /// Short-lived access token.
    pub access_token: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
}

/// `POST /auth/refresh` response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    /// A freshly issued access token.
    pub access_token: String,
}

/// `POST /analyses` request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnalysisRequest {
    /// 20-8,000 characters.
    pub problem_description: String,
    /// Enumerated business domain.
    pub business_type: BusinessType,
    /// Requested thoroughness.
    pub depth: Depth,
}

/// `POST /analyses` response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnalysisResponse {
    /// The newly created analysis's id.
    pub analysis_id: Uuid,
    /// Always `pending` at creation time.
    pub status: AnalysisStatus,
}

/// One agent's contribution, as returned in [`AnalysisResponse`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutputResponse {
    /// Which agent produced this output.
    pub name: AgentName,
    /// That agent's lifecycle status.
    pub status: AgentStatus,
    /// Rendered output text; empty on failure.
    pub output: String,
    /// Input plus output tokens for this agent's call.
    pub tokens: i64,
    /// Wall-clock duration of the call, in milliseconds.
    pub latency_ms: i64,
}

impl From<AgentOutputRow> for AgentOutputResponse {
    fn from(row: AgentOutputRow) -> Self {
        Self {
            name: row.agent_name,
            status: row.status,
            output: row.output_text,
            tokens: row.tokens_in + row.tokens_out,
            latency_ms: row.latency_ms,
        }
    }
}

/// Run-level totals, as returned in [`AnalysisResponse`].
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatesResponse {
    /// Input plus output tokens across every agent.
    pub tokens: i64,
    /// Total cost in USD across every agent.
    pub cost_usd: f64,
    /// `max(agent end) - min(agent start)`, in milliseconds.
    pub latency_ms: i64,
}

/// `GET /analyses/{id}` response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    /// Primary key.
    pub id: Uuid,
    /// Lifecycle status.
    pub status: AnalysisStatus,
    /// The original problem statement.
    pub problem: String,
    /// Enumerated business domain.
    pub business_type: BusinessType,
    /// Requested thoroughness.
    pub depth: Depth,
    /// Whether the reviewer completed but some other agent did not.
    pub partial_failure: bool,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Set iff `status` is `completed` or `failed`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Every agent's output, in [`AgentName::ALL`] order.
    pub agent_outputs: Vec<AgentOutputResponse>,
    /// Run-level totals.
    pub aggregates: AggregatesResponse,
}

impl AnalysisResponse {
    /// Builds the full response from the analysis row and its agent outputs.
    #[must_use]
    pub fn new(analysis: AnalysisRow, agent_outputs: Vec<AgentOutputRow>) -> Self {
        Self {
            id: analysis.id,
            status: analysis.status,
            problem: analysis.problem_description,
            business_type: analysis.business_type,
            depth: analysis.depth,
            partial_failure: analysis.partial_failure,
            created_at: analysis.created_at,
            completed_at: analysis.completed_at,
            agent_outputs: agent_outputs.into_iter().map(AgentOutputResponse::from).collect(),
            aggregates: AggregatesResponse {
                tokens: analysis.tokens_in + analysis.tokens_out,
                cost_usd: analysis.cost_usd,
                latency_ms: analysis.latency_ms,
            },
        }
    }
}

/// One entry in the `GET /analyses` list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummaryResponse {
    /// Primary key.
    pub id: Uuid,
    /// Lifecycle status.
    pub status: AnalysisStatus,
    /// Enumerated business domain.
    pub business_type: BusinessType,
    /// Requested thoroughness.
    pub depth: Depth,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Set iff `status` is `completed` or `failed`.
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&AnalysisRow> for AnalysisSummaryResponse {
    fn from(row: &AnalysisRow) -> Self {
        Self {
            id: row.id,
            status: row.status,
            business_type: row.business_type,
            depth: row.depth,
            created_at: row.created_at,
            completed_at: row.completed_at,
        }
    }
}

/// `GET /analyses` response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysesListResponse {
    /// Summaries, most recent first.
    pub items: Vec<AnalysisSummaryResponse>,
    /// `created_at` cursor for the next page, `None` at the end.
    pub next_cursor: Option<DateTime<Utc>>,
}

/// `POST /analyses/{id}/refine` request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineRequest {
    /// The follow-up question.
    pub message: String,
}

/// Quota usage, as returned alongside a refine reply.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    /// Messages consumed this cycle, including this one.
    pub used: i64,
    /// The plan's limit, `-1` if unbounded.
    pub limit: i64,
    /// Messages remaining, `-1` if unbounded.
    pub remaining: i64,
}

impl UsageResponse {
    /// Builds a response from a raw used/limit/remaining triple.
    #[must_use]
    pub const fn new(used: i64, limit: Limit, remaining: i64) -> Self {
        Self { used, limit: limit.as_i64(), remaining }
    }
}

/// `POST /analyses/{id}/refine` response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineResponse {
    /// The assistant's reply text.
    pub reply: String,
    /// Quota usage after this call.
    pub usage: UsageResponse,
}

/// `POST /webhooks/billing` request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingWebhookRequest {
    /// The organization whose plan changed.
    pub org_id: Uuid,
    /// The plan to apply.
    pub new_plan: Plan,
    /// Start of the new billing cycle.
    pub cycle_start: DateTime<Utc>,
}

/// `GET /health/ready` response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReadyResponse {
    /// Whether the persistence store answered a trivial query.
    pub store_reachable: bool,
    /// Whether the queue backend answered a trivial query. Always `true`
    /// for the in-process backend.
    pub queue_reachable: bool,
}

/// Uniform error body for every non-2xx response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// A stable error kind name.
    pub error: String,
    /// A user-safe message; never a stack trace or raw provider error.
    pub message: String,
    /// Present for `quota_exceeded`: units consumed this cycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used: Option<i64>,
    /// Present for `quota_exceeded`: the plan's limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    /// Present for `quota_exceeded`: the plan one tier up, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_to: Option<Plan>,
    /// Present for `rate_limited`: seconds until the caller may retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorResponse {
    /// A plain error with no extra fields.
    #[must_use]
    pub fn simple(error: &str, message: impl Into<String>) -> Self {
        Self { error: error.to_string(), message: message.into(), used: None, limit: None, upgrade_to: None, retry_after: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseforge_domain::{AgentStatus, AnalysisStatus};

    #[test]
    fn agent_output_response_sums_tokens() {
        let row = AgentOutputRow {
            analysis_id: Uuid::new_v4(),
            agent_name: AgentName::Analyst,
            output_text: "text".to_string(),
            status: AgentStatus::Completed,
            tokens_in: 100,
            tokens_out: 50,
            cost_usd: 0.01,
            latency_ms: 1200,
            error: None,
            started_at: None,
            completed_at: None,
        };
        let response = AgentOutputResponse::from(row);
        assert_eq!(response.tokens, 150);
    }

    #[test]
    fn usage_response_reports_unbounded_as_negative_one() {
        let response = UsageResponse::new(10, Limit::Unbounded, -1);
        assert_eq!(response.limit, -1);
        assert_eq!(response.remaining, -1);
    }

    #[test]
    fn analysis_summary_omits_problem_text() {
        let row = AnalysisRow {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            creator_user_id: Uuid::new_v4(),
            problem_description: "a long problem statement goes here".to_string(),
            business_type: BusinessType::Saas,
            depth: Depth::Standard,
            status: AnalysisStatus::Completed,
            partial_failure: false,
            created_at: Utc::now(),
            started_at: None,
            completed_at: Some(Utc::now()),
            tokens_in: 10,
            tokens_out: 10,
            cost_usd: 0.1,
            latency_ms: 10,
        };
        let summary = AnalysisSummaryResponse::from(&row);
        assert_eq!(summary.id, row.id);
    }

    #[test]
    fn error_response_simple_has_no_optional_fields() {
        let err = ErrorResponse::simple("not_found", "analysis not found");
        assert!(err.used.is_none());
        assert!(err.upgrade_to.is_none());
    }
}
