//! Reclaims analyses left `running` by a worker that died mid-job.
//! Runs once at startup, then every five minutes.

use std::time::Duration;

use caseforge_database::{DbError, Repositories};
use caseforge_observability::{LogEvent, events, log_event};

const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
const ORPHAN_REASON: &str = "worker lost";

/// Runs the orphan sweep immediately, then on a five-minute interval,
/// until the process exits.
pub async fn run_sweep(repos: Repositories) {
    loop {
        if let Err(e) = sweep_once(&repos).await {
            log::error!("orphan sweep failed: {e}");
        }
        tokio::time::sleep(SWEEP_INTERVAL).await;
    }
}

async fn sweep_once(repos: &Repositories) -> Result<(), DbError> {
    let orphaned = repos.analyses.find_orphaned_running().await?;
    for analysis in orphaned {
        repos.analyses.mark_failed(analysis.org_id, analysis.id, ORPHAN_REASON).await?;
        let org_id = analysis.org_id.to_string();
        log_event(
            log::Level::Warn,
            &LogEvent { org_id: Some(&org_id), ..LogEvent::new(events::WORKER_SWEEP_RECLAIMED) },
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use caseforge_database_models::NewAnalysis;
    use caseforge_domain::{AnalysisStatus, BusinessType, Depth, Plan, Role};
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn sweep_leaves_pending_analyses_untouched() {
        let repos = caseforge_database::mem::repositories();
        let org = repos.orgs.create("Acme", Plan::Free, Utc::now()).await.unwrap();
        let user = repos.users.create(org.id, "owner@example.com", "hash", Role::Owner).await.unwrap();
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

        sweep_once(&repos).await.unwrap();

        let reloaded = repos.analyses.get(org.id, analysis.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, AnalysisStatus::Pending);
    }
}
