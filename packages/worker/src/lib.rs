#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Dequeue-process-ack worker pool.
//!
//! Three duties share a process: the pool itself (dequeue, orchestrate,
//! persist, ack/nack), the outbox pump that hands newly-created jobs to the
//! queue backend, and a periodic sweep that reclaims analyses left
//! `running` by a worker that died mid-job. `caseforge_server` writes the
//! analysis and its outbox row transactionally; this crate owns the other
//! half of that pattern.

mod outbox;
mod sweep;

pub use outbox::run_outbox_pump;
pub use sweep::run_sweep;

use std::sync::Arc;
use std::time::{Duration, Instant};

use caseforge_ai::context::ExecutionContext;
use caseforge_ai::orchestrator;
use caseforge_ai::providers::CompletionProvider;
use caseforge_ai::templates::TemplateStore;
use caseforge_database::Repositories;
use caseforge_database_models::{AnalysisAggregates, NewAgentOutput};
use caseforge_domain::{AgentName, AgentStatus, AnalysisStatus, ExecutionOutcome};
use caseforge_queue::{DequeuedJob, JobQueue, RUN_ANALYSIS};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// How long a single `dequeue` call blocks before returning `None`.
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(30);
/// Added on top of the summed per-agent timeouts for the outer deadline.
const DEADLINE_SLACK: Duration = Duration::from_secs(30);
/// Hard cap on the outer deadline regardless of how many agents are enabled.
const MAX_EXECUTION_DEADLINE: Duration = Duration::from_secs(600);

/// Errors that cause a job to be `nack`ed rather than `ack`ed:
/// infrastructure errors only — agent-level failures are recorded
/// into the analysis as `failed`/`partial_failure`, not reported as `Err`
/// here).
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The persistence store was unreachable or rejected a write.
    #[error("store error: {0}")]
    Store(#[from] caseforge_database::DbError),
}

/// Runs `worker_count` dequeue loops concurrently until the process exits.
pub async fn run_pool(
    worker_count: usize,
    repos: Repositories,
    queue: Arc<dyn JobQueue>,
    provider: Arc<dyn CompletionProvider>,
    templates: Arc<TemplateStore>,
) {
    let mut handles = Vec::with_capacity(worker_count);
    for id in 0..worker_count {
        let repos = repos.clone();
        let queue = Arc::clone(&queue);
        let provider = Arc::clone(&provider);
        let templates = Arc::clone(&templates);
        handles.push(tokio::spawn(worker_loop(id, repos, queue, provider, templates)));
    }
    for handle in handles {
        if let Err(e) = handle.await {
            log::error!("worker task panicked: {e}");
        }
    }
}

async fn worker_loop(
    id: usize,
    repos: Repositories,
    queue: Arc<dyn JobQueue>,
    provider: Arc<dyn CompletionProvider>,
    templates: Arc<TemplateStore>,
) {
    log::info!("worker {id} started");
    loop {
        let job = match queue.dequeue(DEQUEUE_TIMEOUT).await {
            Ok(Some(job)) => job,
            Ok(None) => continue,
            Err(e) => {
                log::error!("worker {id} dequeue failed: {e}");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        if job.job_type != RUN_ANALYSIS {
            log::warn!("worker {id} dropping unknown job type {}", job.job_type);
            let _ignore = queue.ack(job.id).await;
            continue;
        }

        match process(&repos, Arc::clone(&provider), &templates, &job).await {
            Ok(()) => {
                if let Err(e) = queue.ack(job.id).await {
                    log::error!("worker {id} failed to ack job {}: {e}", job.id);
                }
            }
            Err(e) => {
                log::error!("worker {id} failed to process job {}: {e}", job.id);
                if let Err(nack_err) = queue.nack(job.id, e.to_string()).await {
                    log::error!("worker {id} failed to nack job {}: {nack_err}", job.id);
                }
            }
        }
    }
}

/// Sums enabled agents' default timeouts plus slack, capped at ten minutes.
fn execution_deadline(enabled_agents: &[AgentName]) -> Duration {
    let sum: Duration = enabled_agents.iter().map(|a| a.default_timeout()).sum();
    (sum + DEADLINE_SLACK).min(MAX_EXECUTION_DEADLINE)
}

/// Maps a monotonic instant onto a wall-clock timestamp, anchored at the
/// instant `orchestrator::execute` was invoked. `AgentMetadata` only tracks
/// `Instant`s (immune to clock adjustments mid-run); this is the one place
/// that needs an absolute timestamp to persist.
fn to_wall_clock(anchor_wall: DateTime<Utc>, anchor_mono: Instant, instant: Option<Instant>) -> Option<DateTime<Utc>> {
    let instant = instant?;
    let offset = instant.checked_duration_since(anchor_mono)?;
    chrono::Duration::from_std(offset).ok().and_then(|d| anchor_wall.checked_add_signed(d))
}

fn duration_ms(start: Option<Instant>, end: Option<Instant>) -> i64 {
    match (start, end) {
        (Some(s), Some(e)) => i64::try_from(e.saturating_duration_since(s).as_millis()).unwrap_or(i64::MAX),
        _ => 0,
    }
}

/// Processes one dequeued `run_analysis` job.
///
/// # Errors
///
/// Returns [`WorkerError`] only for store failures; every other outcome —
/// missing analysis, duplicate delivery, agent failure, orchestration
/// timeout — resolves to `Ok(())` so the caller `ack`s the job.
pub async fn process(
    repos: &Repositories,
    provider: Arc<dyn CompletionProvider>,
    templates: &TemplateStore,
    job: &DequeuedJob,
) -> Result<(), WorkerError> {
    let org_id = job.payload.org_id;
    let analysis_id = job.payload.analysis_id;

    let Some(analysis) = repos.analyses.get(org_id, analysis_id).await? else {
        log::warn!("job {} references missing analysis {analysis_id}", job.id);
        return Ok(());
    };

    if analysis.status != AnalysisStatus::Pending {
        log::info!(
            "job {} duplicate delivery for analysis {analysis_id}, already {:?}",
            job.id,
            analysis.status
        );
        return Ok(());
    }

    let Some(org) = repos.orgs.get(org_id).await? else {
        log::error!("job {} references missing organization {org_id}", job.id);
        repos.analyses.mark_failed(org_id, analysis_id, "organization not found").await?;
        return Ok(());
    };

    repos.analyses.update_status(org_id, analysis_id, AnalysisStatus::Running).await?;

    let enabled_agents = org.plan.definition().enabled_agents;
    let mut ctx = ExecutionContext::new(
        analysis.problem_description.clone(),
        analysis.business_type,
        analysis.depth,
        None,
    );

    let anchor_wall = Utc::now();
    let anchor_mono = Instant::now();
    let deadline = execution_deadline(enabled_agents);

    let exec_result = tokio::time::timeout(
        deadline,
        orchestrator::execute(&mut ctx, templates, Arc::clone(&provider), enabled_agents),
    )
    .await;

    let (status, partial_failure) = match exec_result {
        Ok(Ok(ExecutionOutcome::Completed)) => (AnalysisStatus::Completed, false),
        Ok(Ok(ExecutionOutcome::PartialFailure)) => (AnalysisStatus::Completed, true),
        Ok(Ok(ExecutionOutcome::Failed)) => (AnalysisStatus::Failed, false),
        Ok(Err(ai_error)) => {
            log::error!("analysis {analysis_id} orchestration error: {ai_error}");
            (AnalysisStatus::Failed, false)
        }
        Err(_elapsed) => {
            log::error!("analysis {analysis_id} exceeded execution deadline of {deadline:?}");
            (AnalysisStatus::Failed, false)
        }
    };

    for agent in enabled_agents {
        let meta = ctx.metadata(*agent);
        if meta.status == AgentStatus::Pending {
            // Never reached: an outer-deadline cut-off or a DAG error
            // before its layer ran.
            continue;
        }
        let new_output = NewAgentOutput {
            output_text: ctx.output(*agent).unwrap_or_default().to_string(),
            status: meta.status,
            tokens_in: meta.input_tokens,
            tokens_out: meta.output_tokens,
            cost_usd: meta.cost_usd,
            latency_ms: duration_ms(meta.start, meta.end),
            error: meta.error,
            started_at: to_wall_clock(anchor_wall, anchor_mono, meta.start),
            completed_at: to_wall_clock(anchor_wall, anchor_mono, meta.end),
        };
        repos.agent_outputs.upsert(analysis_id, *agent, new_output).await?;
    }

    let agg = ctx.aggregates();
    repos
        .analyses
        .update_aggregates(
            org_id,
            analysis_id,
            status,
            partial_failure,
            AnalysisAggregates {
                tokens_in: agg.input_tokens,
                tokens_out: agg.output_tokens,
                cost_usd: agg.cost_usd,
                latency_ms: agg.latency_ms,
            },
        )
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use caseforge_ai::providers::{Completion, ProviderError};
    use caseforge_database_models::NewAnalysis;
    use caseforge_domain::{BusinessType, Depth, Plan};
    use caseforge_queue::RunAnalysisPayload;
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    struct StubProvider;

    #[async_trait::async_trait]
    impl CompletionProvider for StubProvider {
        async fn complete(
            &self,
            _system_prompt: &str,
            _user_message: &str,
            _model: &str,
            _max_tokens: u32,
            _deadline: Instant,
        ) -> Result<Completion, ProviderError> {
            Ok(Completion { text: "stub reply".to_string(), input_tokens: 10, output_tokens: 5 })
        }
    }

    async fn seed_pending_analysis(repos: &Repositories, plan: Plan) -> (uuid::Uuid, uuid::Uuid) {
        let org = repos.orgs.create("Acme", plan, Utc::now()).await.unwrap();
        let user = repos
            .users
            .create(org.id, "owner@example.com", "hash", caseforge_domain::Role::Owner)
            .await
            .unwrap();
        let (analysis, _job) = repos
            .analyses
            .create_with_job(NewAnalysis {
                id: Uuid::new_v4(),
                org_id: org.id,
                creator_user_id: user.id,
                problem_description: "a".repeat(30),
                business_type: BusinessType::Saas,
                depth: Depth::Fast,
            })
            .await
            .unwrap();
        (org.id, analysis.id)
    }

    #[tokio::test]
    async fn process_missing_analysis_is_a_noop_ack() {
        let repos = caseforge_database::mem::repositories();
        let templates = TemplateStore::validate().unwrap();
        let job = DequeuedJob {
            id: Uuid::new_v4(),
            job_type: RUN_ANALYSIS.to_string(),
            payload: RunAnalysisPayload { analysis_id: Uuid::new_v4(), org_id: Uuid::new_v4() },
            attempts: 1,
        };

        let result = process(&repos, Arc::new(StubProvider), &templates, &job).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn process_runs_enabled_agents_and_marks_completed() {
        let repos = caseforge_database::mem::repositories();
        let templates = TemplateStore::validate().unwrap();
        let (org_id, analysis_id) = seed_pending_analysis(&repos, Plan::Free).await;

        let job = DequeuedJob {
            id: Uuid::new_v4(),
            job_type: RUN_ANALYSIS.to_string(),
            payload: RunAnalysisPayload { analysis_id, org_id },
            attempts: 1,
        };

        process(&repos, Arc::new(StubProvider), &templates, &job).await.unwrap();

        let analysis = repos.analyses.get(org_id, analysis_id).await.unwrap().unwrap();
        assert_eq!(analysis.status, AnalysisStatus::Completed);
        assert!(!analysis.partial_failure);
        assert!(analysis.tokens_in > 0);

        let outputs = repos.agent_outputs.list(analysis_id).await.unwrap();
        // Free plan enables analyst, commercial, reviewer.
        assert_eq!(outputs.len(), 3);
    }

    #[tokio::test]
    async fn process_skips_duplicate_delivery() {
        let repos = caseforge_database::mem::repositories();
        let templates = TemplateStore::validate().unwrap();
        let (org_id, analysis_id) = seed_pending_analysis(&repos, Plan::Free).await;
        repos.analyses.update_status(org_id, analysis_id, AnalysisStatus::Running).await.unwrap();

        let job = DequeuedJob {
            id: Uuid::new_v4(),
            job_type: RUN_ANALYSIS.to_string(),
            payload: RunAnalysisPayload { analysis_id, org_id },
            attempts: 2,
        };

        process(&repos, Arc::new(StubProvider), &templates, &job).await.unwrap();

        // update_status was never called again with Running->Running churn;
        // status stays exactly as the (simulated) first delivery left it.
        let analysis = repos.analyses.get(org_id, analysis_id).await.unwrap().unwrap();
        assert_eq!(analysis.status, AnalysisStatus::Running);
    }

    #[test]
    fn execution_deadline_caps_at_ten_minutes() {
        let all = AgentName::ALL;
        let deadline = execution_deadline(&all);
        assert!(deadline <= MAX_EXECUTION_DEADLINE);
    }

    #[test]
    fn duration_ms_is_zero_when_never_started() {
        assert_eq!(duration_ms(None, None), 0);
    }
}
