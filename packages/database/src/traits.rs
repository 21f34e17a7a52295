//! Repository interfaces.
//!
//! Every call that touches tenant data carries `org_id` as an explicit
//! parameter; implementations must reject rather than silently scope a call
//! that omits it.

use std::sync::Arc;

use caseforge_database_models::{
    AgentOutputRow, AnalysisAggregates, AnalysisRow, JobRow, NewAgentOutput, NewAnalysis,
    NewRefineMessage, OrganizationRow, QuotaOutcome, RefineMessageRow, UserRow,
};
use caseforge_domain::{AgentName, AnalysisStatus, JobStatus, Limit, Plan, QuotaFeature, Role};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::DbError;

/// Organization (tenant) repository.
#[async_trait::async_trait]
pub trait OrgRepository: Send + Sync {
    /// Creates a new organization on the given plan, with its billing cycle
    /// anchored at `cycle_start`.
    async fn create(&self, name: &str, plan: Plan, cycle_start: DateTime<Utc>) -> Result<OrganizationRow, DbError>;

    /// Looks up an organization by id.
    async fn get(&self, org_id: Uuid) -> Result<Option<OrganizationRow>, DbError>;

    /// Updates an organization's plan and billing cycle start, as driven by
    /// the billing webhook.
    async fn set_plan(&self, org_id: Uuid, plan: Plan, cycle_start: DateTime<Utc>) -> Result<(), DbError>;
}

/// User repository.
#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    /// Looks up a user by their normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRow>, DbError>;

    /// Looks up a user by id, scoped to the owning organization.
    async fn get(&self, org_id: Uuid, user_id: Uuid) -> Result<Option<UserRow>, DbError>;

    /// Creates a new user under `org_id`.
    async fn create(
        &self,
        org_id: Uuid,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<UserRow, DbError>;

    /// Replaces a user's stored password hash.
    async fn update_password(&self, org_id: Uuid, user_id: Uuid, password_hash: &str) -> Result<(), DbError>;
}

/// Analysis repository.
#[async_trait::async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// Inserts a new analysis row and its outbox job row as a single unit of
    /// work.
    async fn create_with_job(&self, new: NewAnalysis) -> Result<(AnalysisRow, JobRow), DbError>;

    /// Transitions an analysis's status. Callers are responsible for only
    /// requesting monotone transitions.
    async fn update_status(&self, org_id: Uuid, id: Uuid, status: AnalysisStatus) -> Result<(), DbError>;

    /// Writes final aggregates, status, and the `partial_failure` flag
    /// (agent_output upserts happen alongside via
    /// [`AgentOutputRepository::upsert`]).
    async fn update_aggregates(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: AnalysisStatus,
        partial_failure: bool,
        aggregates: AnalysisAggregates,
    ) -> Result<(), DbError>;

    /// Fetches one analysis, scoped to `org_id`. Returns `Ok(None)` when the
    /// row doesn't exist; callers distinguish "not found" from
    /// "belongs to another tenant" by never being given the other tenant's
    /// row in the first place.
    async fn get(&self, org_id: Uuid, id: Uuid) -> Result<Option<AnalysisRow>, DbError>;

    /// Lists analyses for `org_id`, most recent first, paginated by a
    /// `created_at` cursor.
    async fn list(
        &self,
        org_id: Uuid,
        limit: u32,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<Vec<AnalysisRow>, DbError>;

    /// Finds analyses stuck in `running` with no corresponding active job,
    /// for the startup/periodic worker sweep.
    async fn find_orphaned_running(&self) -> Result<Vec<AnalysisRow>, DbError>;

    /// Marks an analysis `failed` with a fixed reason, used by the sweep.
    async fn mark_failed(&self, org_id: Uuid, id: Uuid, reason: &str) -> Result<(), DbError>;
}

/// Per-agent output repository.
#[async_trait::async_trait]
pub trait AgentOutputRepository: Send + Sync {
    /// Inserts or replaces the row for `(analysis_id, agent_name)`.
    async fn upsert(&self, analysis_id: Uuid, agent_name: AgentName, row: NewAgentOutput) -> Result<(), DbError>;

    /// Lists every agent output recorded for an analysis.
    async fn list(&self, analysis_id: Uuid) -> Result<Vec<AgentOutputRow>, DbError>;
}

/// Refinement conversation repository.
#[async_trait::async_trait]
pub trait RefineRepository: Send + Sync {
    /// Appends one message (user or assistant) to an analysis's
    /// refinement conversation.
    async fn append(&self, row: NewRefineMessage) -> Result<RefineMessageRow, DbError>;

    /// Lists the most recent `limit` messages for an analysis, ordered by
    /// `created_at` ascending.
    async fn list(&self, org_id: Uuid, analysis_id: Uuid, limit: u32) -> Result<Vec<RefineMessageRow>, DbError>;
}

/// Quota/usage counter repository.
#[async_trait::async_trait]
pub trait UsageRepository: Send + Sync {
    /// Atomically reads, compares against `limit`, and (if within limit)
    /// increments the counter for `(org_id, feature, key)` in the cycle
    /// starting at `period_start`.
    ///
    /// `Limit::Unbounded` always returns `Allowed` without touching storage.
    async fn check_and_consume(
        &self,
        org_id: Uuid,
        feature: QuotaFeature,
        key: Option<Uuid>,
        limit: Limit,
        period_start: DateTime<Utc>,
    ) -> Result<QuotaOutcome, DbError>;

    /// Reads the current counter value without mutating it.
    async fn get(
        &self,
        org_id: Uuid,
        feature: QuotaFeature,
        key: Option<Uuid>,
        period_start: DateTime<Utc>,
    ) -> Result<i64, DbError>;

    /// Rolls every counter for `org_id` over to a new cycle. Idempotent.
    async fn reset_cycle(&self, org_id: Uuid, new_period_start: DateTime<Utc>) -> Result<(), DbError>;
}

/// Outbox job repository.
#[async_trait::async_trait]
pub trait JobRepository: Send + Sync {
    /// Fetches a job by id.
    async fn get(&self, job_id: Uuid) -> Result<Option<JobRow>, DbError>;

    /// Lists outbox rows not yet handed to the queue backend, for the
    /// outbox pump.
    async fn list_undispatched(&self, limit: u32) -> Result<Vec<JobRow>, DbError>;

    /// Marks a row as handed off to the queue backend.
    async fn mark_dispatched(&self, job_id: Uuid) -> Result<(), DbError>;

    /// Updates a job's lifecycle status, optionally recording an error.
    async fn update_status(&self, job_id: Uuid, status: JobStatus, last_error: Option<&str>) -> Result<(), DbError>;

    /// Increments the delivery attempt counter and returns the new count.
    async fn increment_attempts(&self, job_id: Uuid) -> Result<i32, DbError>;
}

/// Bundle of every repository, handed to the API and worker binaries as one
/// unit.
#[derive(Clone)]
pub struct Repositories {
    /// Organization repository.
    pub orgs: Arc<dyn OrgRepository>,
    /// User repository.
    pub users: Arc<dyn UserRepository>,
    /// Analysis repository.
    pub analyses: Arc<dyn AnalysisRepository>,
    /// Agent output repository.
    pub agent_outputs: Arc<dyn AgentOutputRepository>,
    /// Refinement conversation repository.
    pub refine: Arc<dyn RefineRepository>,
    /// Quota/usage repository.
    pub usage: Arc<dyn UsageRepository>,
    /// Outbox job repository.
    pub jobs: Arc<dyn JobRepository>,
}
