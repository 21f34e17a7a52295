#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Database row types.
//!
//! These are the shapes of data as stored in and retrieved from the
//! persistence store. They are distinct from the API request/response types
//! in `caseforge_server_models`.

use caseforge_domain::{AgentName, AgentStatus, AnalysisStatus, BusinessType, Depth, Plan, RefineRole, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An organization (tenant) row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRow {
    /// Primary key.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Current subscription tier.
    pub plan: Plan,
    /// Start of the current 30-day billing cycle.
    pub cycle_start: DateTime<Utc>,
    /// Whether billing considers the subscription active.
    pub subscription_active: bool,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

/// A user row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRow {
    /// Primary key.
    pub id: Uuid,
    /// Owning organization.
    pub org_id: Uuid,
    /// Lowercase-normalized email, unique within the store.
    pub email: String,
    /// Bcrypt-class password hash. Never serialized to API responses.
    pub password_hash: String,
    /// Role within the organization.
    pub role: Role,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

/// An analysis row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRow {
    /// Primary key.
    pub id: Uuid,
    /// Owning organization. Every read/write is scoped by this.
    pub org_id: Uuid,
    /// The user who submitted the problem.
    pub creator_user_id: Uuid,
    /// The submitted problem statement, 20-8,000 chars.
    pub problem_description: String,
    /// Enumerated business domain.
    pub business_type: BusinessType,
    /// Requested thoroughness.
    pub depth: Depth,
    /// Lifecycle status.
    pub status: AnalysisStatus,
    /// Whether the reviewer completed but some other agent did not.
    pub partial_failure: bool,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// When a worker picked this up (`status` transitioned to `running`).
    pub started_at: Option<DateTime<Utc>>,
    /// Set iff `status` is `completed` or `failed`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Sum of agent input tokens.
    pub tokens_in: i64,
    /// Sum of agent output tokens.
    pub tokens_out: i64,
    /// Sum of agent cost in USD.
    pub cost_usd: f64,
    /// `max(agent end) - min(agent start)` in milliseconds.
    pub latency_ms: i64,
}

/// One agent's execution outcome within one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutputRow {
    /// Owning analysis.
    pub analysis_id: Uuid,
    /// Which of the five agents this row is for. Unique with `analysis_id`.
    pub agent_name: AgentName,
    /// Rendered output text; may be empty on failure.
    pub output_text: String,
    /// Lifecycle status.
    pub status: AgentStatus,
    /// Input tokens consumed by this agent's call.
    pub tokens_in: i64,
    /// Output tokens produced by this agent's call.
    pub tokens_out: i64,
    /// Computed cost in USD.
    pub cost_usd: f64,
    /// Wall-clock duration of the call, in milliseconds.
    pub latency_ms: i64,
    /// User-safe error description, set on `failed`/`timeout`.
    pub error: Option<String>,
    /// When this agent's call began.
    pub started_at: Option<DateTime<Utc>>,
    /// When this agent's call settled.
    pub completed_at: Option<DateTime<Utc>>,
}

/// One entry in a per-analysis refinement conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefineMessageRow {
    /// Primary key.
    pub id: Uuid,
    /// Owning analysis.
    pub analysis_id: Uuid,
    /// Owning organization (denormalized for tenant-scoped queries).
    pub org_id: Uuid,
    /// Who sent this message.
    pub role: RefineRole,
    /// Message text.
    pub content: String,
    /// Total tokens consumed producing this message. Zero for `user` rows.
    pub tokens: i64,
    /// Insertion order; defines the conversation's total order.
    pub created_at: DateTime<Utc>,
}

/// A per-(org, feature[, key]) usage counter row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageCounterRow {
    /// Owning organization.
    pub org_id: Uuid,
    /// Which counted feature this row tracks.
    pub feature: String,
    /// Optional secondary key (e.g. an analysis id for per-analysis refine
    /// counters). `None` for org-wide counters like `analyses_created`.
    pub key: Option<Uuid>,
    /// Start of the billing cycle this counter applies to.
    pub period_start: DateTime<Utc>,
    /// Current count. Monotonically increasing within a cycle.
    pub count: i64,
}

/// A durable queue entry, written transactionally alongside its analysis
/// (outbox pattern) and later dispatched to the job queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRow {
    /// Primary key.
    pub id: Uuid,
    /// Job type; only `"run_analysis"` is in scope.
    pub job_type: String,
    /// Owning organization.
    pub org_id: Uuid,
    /// The analysis this job processes.
    pub analysis_id: Uuid,
    /// Lifecycle status.
    pub status: caseforge_domain::JobStatus,
    /// Delivery attempts so far. Marked `failed` at 3.
    pub attempts: i32,
    /// Most recent failure description, if any.
    pub last_error: Option<String>,
    /// Whether the outbox pump has handed this row to the queue backend.
    pub dispatched: bool,
    /// Row creation time; also the initial `scheduled_at`.
    pub scheduled_at: DateTime<Utc>,
}

/// Fields needed to insert a new [`AnalysisRow`] plus its outbox [`JobRow`]
/// in one transaction.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    /// Primary key to assign.
    pub id: Uuid,
    /// Owning organization.
    pub org_id: Uuid,
    /// Submitting user.
    pub creator_user_id: Uuid,
    /// Submitted problem statement.
    pub problem_description: String,
    /// Enumerated business domain.
    pub business_type: BusinessType,
    /// Requested thoroughness.
    pub depth: Depth,
}

/// Aggregate totals computed by the orchestrator, written back at job
/// completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisAggregates {
    /// Sum of agent input tokens.
    pub tokens_in: i64,
    /// Sum of agent output tokens.
    pub tokens_out: i64,
    /// Sum of agent cost in USD.
    pub cost_usd: f64,
    /// `max(agent end) - min(agent start)` in milliseconds.
    pub latency_ms: i64,
}

/// Fields needed to upsert one [`AgentOutputRow`].
#[derive(Debug, Clone)]
pub struct NewAgentOutput {
    /// Rendered output text; may be empty on failure.
    pub output_text: String,
    /// Lifecycle status.
    pub status: AgentStatus,
    /// Input tokens consumed by this agent's call.
    pub tokens_in: i64,
    /// Output tokens produced by this agent's call.
    pub tokens_out: i64,
    /// Computed cost in USD.
    pub cost_usd: f64,
    /// Wall-clock duration of the call, in milliseconds.
    pub latency_ms: i64,
    /// User-safe error description, set on `failed`/`timeout`.
    pub error: Option<String>,
    /// When this agent's call began.
    pub started_at: Option<DateTime<Utc>>,
    /// When this agent's call settled.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields needed to append one [`RefineMessageRow`].
#[derive(Debug, Clone)]
pub struct NewRefineMessage {
    /// Primary key to assign.
    pub id: Uuid,
    /// Owning analysis.
    pub analysis_id: Uuid,
    /// Owning organization.
    pub org_id: Uuid,
    /// Who sent this message.
    pub role: RefineRole,
    /// Message text.
    pub content: String,
    /// Total tokens consumed producing this message.
    pub tokens: i64,
}

/// Result of a [`caseforge_database_models`] quota check, mirroring spec
/// §4.10's `check_and_consume` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaOutcome {
    /// The action was within limit and the counter was incremented.
    Allowed {
        /// Count after the increment.
        used: i64,
    },
    /// The action would exceed the plan limit; counter left unchanged.
    Denied {
        /// Count before the rejected attempt.
        used: i64,
    },
}
