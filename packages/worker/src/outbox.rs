//! Dispatches outbox rows to the queue backend.
//!
//! `AnalysisRepository::create_with_job` writes the analysis and its job
//! row transactionally; the API handler's own
//! `queue.enqueue` call is best-effort and may fail or be skipped entirely.
//! This pump is the durable fallback: anything left undispatched eventually
//! gets picked up here.

use std::sync::Arc;
use std::time::Duration;

use caseforge_database::{DbError, Repositories};
use caseforge_queue::{JobQueue, RunAnalysisPayload};

const PUMP_INTERVAL: Duration = Duration::from_secs(2);
const PUMP_BATCH: u32 = 50;

/// Runs the outbox pump on a fixed interval until the process exits.
pub async fn run_outbox_pump(repos: Repositories, queue: Arc<dyn JobQueue>) {
    let mut ticker = tokio::time::interval(PUMP_INTERVAL);
    loop {
        ticker.tick().await;
        if let Err(e) = pump_once(&repos, queue.as_ref()).await {
            log::error!("outbox pump tick failed: {e}");
        }
    }
}

async fn pump_once(repos: &Repositories, queue: &dyn JobQueue) -> Result<(), DbError> {
    let rows = repos.jobs.list_undispatched(PUMP_BATCH).await?;
    for row in rows {
        let payload = RunAnalysisPayload { analysis_id: row.analysis_id, org_id: row.org_id };
        match queue.enqueue(payload).await {
            Ok(_job_id) => {
                if let Err(e) = repos.jobs.mark_dispatched(row.id).await {
                    log::error!("failed to mark job {} dispatched: {e}", row.id);
                }
            }
            Err(e) => {
                log::warn!("failed to enqueue outbox job {}: {e}, will retry next tick", row.id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use caseforge_database_models::NewAnalysis;
    use caseforge_domain::{BusinessType, Depth, Plan, Role};
    use caseforge_queue::InProcessQueue;
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn pump_dispatches_undispatched_rows() {
        let repos = caseforge_database::mem::repositories();
        let queue: Arc<dyn JobQueue> = Arc::new(InProcessQueue::new());

        let org = repos.orgs.create("Acme", Plan::Free, Utc::now()).await.unwrap();
        let user = repos.users.create(org.id, "owner@example.com", "hash", Role::Owner).await.unwrap();
        repos
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

        let undispatched_before = repos.jobs.list_undispatched(10).await.unwrap();
        assert_eq!(undispatched_before.len(), 1);

        pump_once(&repos, queue.as_ref()).await.unwrap();

        let undispatched_after = repos.jobs.list_undispatched(10).await.unwrap();
        assert!(undispatched_after.is_empty());
    }
}
