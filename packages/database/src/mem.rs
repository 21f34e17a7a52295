//! In-memory repository implementations, used by tests in place of the
//! Postgres-backed ones. Every method applies the same tenant-scoping and
//! uniqueness rules as the production implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use caseforge_database_models::{
    AgentOutputRow, AnalysisAggregates, AnalysisRow, JobRow, NewAgentOutput, NewAnalysis,
    NewRefineMessage, OrganizationRow, QuotaOutcome, RefineMessageRow, UserRow,
};
use caseforge_domain::{AgentName, AnalysisStatus, JobStatus, Limit, Plan, QuotaFeature, Role};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::DbError;
use crate::traits::{
    AgentOutputRepository, AnalysisRepository, JobRepository, OrgRepository, RefineRepository,
    Repositories, UsageRepository, UserRepository,
};

#[derive(Default)]
struct State {
    orgs: Mutex<HashMap<Uuid, OrganizationRow>>,
    users: Mutex<HashMap<Uuid, UserRow>>,
    analyses: Mutex<HashMap<Uuid, AnalysisRow>>,
    jobs: Mutex<HashMap<Uuid, JobRow>>,
    agent_outputs: Mutex<HashMap<(Uuid, AgentName), AgentOutputRow>>,
    refine_messages: Mutex<Vec<RefineMessageRow>>,
    usage_counters: Mutex<HashMap<(Uuid, QuotaFeature, Uuid, DateTime<Utc>), i64>>,
}

/// Builds a [`Repositories`] bundle backed by shared in-process state.
///
/// Every field shares the same underlying `Arc<State>` so that, for example,
/// [`AnalysisRepository::create_with_job`] and [`JobRepository::get`] observe
/// each other's writes the same way two Postgres connections to the same
/// database would.
#[must_use]
pub fn repositories() -> Repositories {
    let state = Arc::new(State::default());
    Repositories {
        orgs: Arc::new(MemRepository(Arc::clone(&state))),
        users: Arc::new(MemRepository(Arc::clone(&state))),
        analyses: Arc::new(MemRepository(Arc::clone(&state))),
        agent_outputs: Arc::new(MemRepository(Arc::clone(&state))),
        refine: Arc::new(MemRepository(Arc::clone(&state))),
        usage: Arc::new(MemRepository(Arc::clone(&state))),
        jobs: Arc::new(MemRepository(state)),
    }
}

struct MemRepository(Arc<State>);

#[async_trait::async_trait]
impl OrgRepository for MemRepository {
    async fn create(&self, name: &str, plan: Plan, cycle_start: DateTime<Utc>) -> Result<OrganizationRow, DbError> {
        let row = OrganizationRow {
            id: Uuid::new_v4(),
            name: name.to_string(),
            plan,
            cycle_start,
            subscription_active: true,
            created_at: Utc::now(),
        };
        self.0.orgs.lock().unwrap().insert(row.id, row.clone());
        Ok(row)
    }

    async fn get(&self, org_id: Uuid) -> Result<Option<OrganizationRow>, DbError> {
        Ok(self.0.orgs.lock().unwrap().get(&org_id).cloned())
    }

    async fn set_plan(&self, org_id: Uuid, plan: Plan, cycle_start: DateTime<Utc>) -> Result<(), DbError> {
        let mut orgs = self.0.orgs.lock().unwrap();
        let org = orgs.get_mut(&org_id).ok_or(DbError::NotFound)?;
        org.plan = plan;
        org.cycle_start = cycle_start;
        Ok(())
    }
}

#[async_trait::async_trait]
impl UserRepository for MemRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRow>, DbError> {
        let email = email.to_lowercase();
        Ok(self.0.users.lock().unwrap().values().find(|u| u.email == email).cloned())
    }

    async fn get(&self, org_id: Uuid, user_id: Uuid) -> Result<Option<UserRow>, DbError> {
        Ok(self
            .0
            .users
            .lock()
            .unwrap()
            .get(&user_id)
            .filter(|u| u.org_id == org_id)
            .cloned())
    }

    async fn create(&self, org_id: Uuid, email: &str, password_hash: &str, role: Role) -> Result<UserRow, DbError> {
        let row = UserRow {
            id: Uuid::new_v4(),
            org_id,
            email: email.to_lowercase(),
            password_hash: password_hash.to_string(),
            role,
            created_at: Utc::now(),
        };
        self.0.users.lock().unwrap().insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_password(&self, org_id: Uuid, user_id: Uuid, password_hash: &str) -> Result<(), DbError> {
        let mut users = self.0.users.lock().unwrap();
        let user = users.get_mut(&user_id).filter(|u| u.org_id == org_id).ok_or(DbError::NotFound)?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }
}

#[async_trait::async_trait]
impl AnalysisRepository for MemRepository {
    async fn create_with_job(&self, new: NewAnalysis) -> Result<(AnalysisRow, JobRow), DbError> {
        let now = Utc::now();
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
            id: Uuid::new_v4(),
            job_type: "run_analysis".to_string(),
            org_id: new.org_id,
            analysis_id: analysis.id,
            status: JobStatus::Queued,
            attempts: 0,
            last_error: None,
            dispatched: false,
            scheduled_at: now,
        };

        self.0.analyses.lock().unwrap().insert(analysis.id, analysis.clone());
        self.0.jobs.lock().unwrap().insert(job.id, job.clone());

        Ok((analysis, job))
    }

    async fn update_status(&self, org_id: Uuid, id: Uuid, status: AnalysisStatus) -> Result<(), DbError> {
        let mut analyses = self.0.analyses.lock().unwrap();
        let analysis = analyses.get_mut(&id).filter(|a| a.org_id == org_id).ok_or(DbError::NotFound)?;
        if status == AnalysisStatus::Running && analysis.started_at.is_none() {
            analysis.started_at = Some(Utc::now());
        }
        analysis.status = status;
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
        let mut analyses = self.0.analyses.lock().unwrap();
        let analysis = analyses.get_mut(&id).filter(|a| a.org_id == org_id).ok_or(DbError::NotFound)?;
        analysis.status = status;
        analysis.partial_failure = partial_failure;
        analysis.completed_at = Some(Utc::now());
        analysis.tokens_in = aggregates.tokens_in;
        analysis.tokens_out = aggregates.tokens_out;
        analysis.cost_usd = aggregates.cost_usd;
        analysis.latency_ms = aggregates.latency_ms;
        Ok(())
    }

    async fn get(&self, org_id: Uuid, id: Uuid) -> Result<Option<AnalysisRow>, DbError> {
        Ok(self.0.analyses.lock().unwrap().get(&id).filter(|a| a.org_id == org_id).cloned())
    }

    async fn list(&self, org_id: Uuid, limit: u32, cursor: Option<DateTime<Utc>>) -> Result<Vec<AnalysisRow>, DbError> {
        let mut rows: Vec<AnalysisRow> = self
            .0
            .analyses
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.org_id == org_id)
            .filter(|a| cursor.is_none_or(|c| a.created_at < c))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn find_orphaned_running(&self) -> Result<Vec<AnalysisRow>, DbError> {
        let jobs = self.0.jobs.lock().unwrap();
        Ok(self
            .0
            .analyses
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.status == AnalysisStatus::Running)
            .filter(|a| {
                !jobs
                    .values()
                    .any(|j| j.analysis_id == a.id && matches!(j.status, JobStatus::Queued | JobStatus::Running))
            })
            .cloned()
            .collect())
    }

    async fn mark_failed(&self, org_id: Uuid, id: Uuid, reason: &str) -> Result<(), DbError> {
        log::warn!("marking analysis {id} failed: {reason}");
        AnalysisRepository::update_status(self, org_id, id, AnalysisStatus::Failed).await
    }
}

#[async_trait::async_trait]
impl AgentOutputRepository for MemRepository {
    async fn upsert(&self, analysis_id: Uuid, agent_name: AgentName, row: NewAgentOutput) -> Result<(), DbError> {
        self.0.agent_outputs.lock().unwrap().insert(
            (analysis_id, agent_name),
            AgentOutputRow {
                analysis_id,
                agent_name,
                output_text: row.output_text,
                status: row.status,
                tokens_in: row.tokens_in,
                tokens_out: row.tokens_out,
                cost_usd: row.cost_usd,
                latency_ms: row.latency_ms,
                error: row.error,
                started_at: row.started_at,
                completed_at: row.completed_at,
            },
        );
        Ok(())
    }

    async fn list(&self, analysis_id: Uuid) -> Result<Vec<AgentOutputRow>, DbError> {
        Ok(self
            .0
            .agent_outputs
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.analysis_id == analysis_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl RefineRepository for MemRepository {
    async fn append(&self, row: NewRefineMessage) -> Result<RefineMessageRow, DbError> {
        let row = RefineMessageRow {
            id: row.id,
            analysis_id: row.analysis_id,
            org_id: row.org_id,
            role: row.role,
            content: row.content,
            tokens: row.tokens,
            created_at: Utc::now(),
        };
        self.0.refine_messages.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn list(&self, org_id: Uuid, analysis_id: Uuid, limit: u32) -> Result<Vec<RefineMessageRow>, DbError> {
        let mut rows: Vec<RefineMessageRow> = self
            .0
            .refine_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.org_id == org_id && m.analysis_id == analysis_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl UsageRepository for MemRepository {
    async fn check_and_consume(
        &self,
        org_id: Uuid,
        feature: QuotaFeature,
        key: Option<Uuid>,
        limit: Limit,
        period_start: DateTime<Utc>,
    ) -> Result<QuotaOutcome, DbError> {
        let Limit::Bounded(max) = limit else {
            return Ok(QuotaOutcome::Allowed { used: 0 });
        };
        let key = key.unwrap_or_else(Uuid::nil);
        let mut counters = self.0.usage_counters.lock().unwrap();
        let used = counters.entry((org_id, feature, key, period_start)).or_insert(0);

        if *used >= max {
            return Ok(QuotaOutcome::Denied { used: *used });
        }
        *used += 1;
        Ok(QuotaOutcome::Allowed { used: *used })
    }

    async fn get(&self, org_id: Uuid, feature: QuotaFeature, key: Option<Uuid>, period_start: DateTime<Utc>) -> Result<i64, DbError> {
        let key = key.unwrap_or_else(Uuid::nil);
        Ok(*self.0.usage_counters.lock().unwrap().get(&(org_id, feature, key, period_start)).unwrap_or(&0))
    }

    async fn reset_cycle(&self, org_id: Uuid, new_period_start: DateTime<Utc>) -> Result<(), DbError> {
        self.0
            .usage_counters
            .lock()
            .unwrap()
            .retain(|(o, _, _, period), _| *o != org_id || *period >= new_period_start);
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobRepository for MemRepository {
    async fn get(&self, job_id: Uuid) -> Result<Option<JobRow>, DbError> {
        Ok(self.0.jobs.lock().unwrap().get(&job_id).cloned())
    }

    async fn list_undispatched(&self, limit: u32) -> Result<Vec<JobRow>, DbError> {
        let mut rows: Vec<JobRow> = self
            .0
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| !j.dispatched && j.status == JobStatus::Queued)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn mark_dispatched(&self, job_id: Uuid) -> Result<(), DbError> {
        let mut jobs = self.0.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(DbError::NotFound)?;
        job.dispatched = true;
        Ok(())
    }

    async fn update_status(&self, job_id: Uuid, status: JobStatus, last_error: Option<&str>) -> Result<(), DbError> {
        let mut jobs = self.0.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(DbError::NotFound)?;
        job.status = status;
        job.last_error = last_error.map(ToString::to_string);
        Ok(())
    }

    async fn increment_attempts(&self, job_id: Uuid) -> Result<i32, DbError> {
        let mut jobs = self.0.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(DbError::NotFound)?;
        job.attempts += 1;
        Ok(job.attempts)
    }
}

#[cfg(test)]
mod tests {
    use caseforge_domain::BusinessType;
    use caseforge_domain::Depth;

    use super::*;

    #[tokio::test]
    async fn create_with_job_links_analysis_and_job() {
        let repos = repositories();
        let org = repos.orgs.create("acme", Plan::Free, Utc::now()).await.unwrap();
        let user = repos.users.create(org.id, "a@acme.test", "hash", Role::Owner).await.unwrap();

        let (analysis, job) = repos
            .analyses
            .create_with_job(NewAnalysis {
                id: Uuid::new_v4(),
                org_id: org.id,
                creator_user_id: user.id,
                problem_description: "x".repeat(20),
                business_type: BusinessType::Saas,
                depth: Depth::Standard,
            })
            .await
            .unwrap();

        assert_eq!(job.analysis_id, analysis.id);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(repos.jobs.list_undispatched(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn check_and_consume_denies_at_limit() {
        let repos = repositories();
        let org_id = Uuid::new_v4();
        let period_start = Utc::now();

        for _ in 0..3 {
            let outcome = repos
                .usage
                .check_and_consume(org_id, QuotaFeature::AnalysesCreated, None, Limit::Bounded(3), period_start)
                .await
                .unwrap();
            assert!(matches!(outcome, QuotaOutcome::Allowed { .. }));
        }

        let outcome = repos
            .usage
            .check_and_consume(org_id, QuotaFeature::AnalysesCreated, None, Limit::Bounded(3), period_start)
            .await
            .unwrap();
        assert_eq!(outcome, QuotaOutcome::Denied { used: 3 });
    }

    #[tokio::test]
    async fn unbounded_limit_never_denies() {
        let repos = repositories();
        let outcome = repos
            .usage
            .check_and_consume(Uuid::new_v4(), QuotaFeature::AnalysesCreated, None, Limit::Unbounded, Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, QuotaOutcome::Allowed { .. }));
    }

    #[tokio::test]
    async fn user_lookup_is_tenant_scoped() {
        let repos = repositories();
        let org_a = repos.orgs.create("a", Plan::Free, Utc::now()).await.unwrap();
        let org_b = repos.orgs.create("b", Plan::Free, Utc::now()).await.unwrap();
        let user = repos.users.create(org_a.id, "u@a.test", "hash", Role::Owner).await.unwrap();

        assert!(repos.users.get(org_b.id, user.id).await.unwrap().is_none());
        assert!(repos.users.get(org_a.id, user.id).await.unwrap().is_some());
    }
}
