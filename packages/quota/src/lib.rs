#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Plan feature gates and per-organization quota enforcement.
//!
//! A quota check is always two steps: resolve which 30-day cycle is
//! current for the organization (rolling it over lazily if its end time has
//! passed), then atomically check-and-consume against that cycle's counter.

use caseforge_database::{DbError, OrgRepository, UsageRepository};
use caseforge_database_models::QuotaOutcome;
use caseforge_domain::{Limit, Plan, QuotaFeature, BILLING_CYCLE};
use caseforge_observability::{events, log_event, LogEvent};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors from a quota check.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// The organization doesn't exist.
    #[error("organization {0} not found")]
    OrgNotFound(Uuid),
    /// Underlying persistence failure.
    #[error("database error: {0}")]
    Database(#[from] DbError),
}

/// The outcome of a quota-gated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Within limit; the counter was incremented.
    Allowed {
        /// Count after the increment.
        used: i64,
        /// The limit checked against.
        limit: Limit,
    },
    /// Over limit; the counter was left unchanged.
    Denied {
        /// Count before the rejected attempt.
        used: i64,
        /// The limit checked against.
        limit: Limit,
        /// The plan one tier up, if any, for an upgrade prompt.
        upgrade_target: Option<Plan>,
    },
}

/// Whether `plan` may run the given agent as part of an analysis.
#[must_use]
pub fn may_use_agent(plan: Plan, agent: caseforge_domain::AgentName) -> bool {
    plan.may_use_agent(agent)
}

/// Whether `plan` may export in the given format.
#[must_use]
pub fn may_export(plan: Plan, format: caseforge_domain::ExportFormat) -> bool {
    plan.may_export(format)
}

fn limit_for(plan: Plan, feature: QuotaFeature) -> Limit {
    let def = plan.definition();
    match feature {
        QuotaFeature::AnalysesCreated => def.analyses_per_cycle,
        QuotaFeature::RefineMessagesPerAnalysis => def.refine_messages_per_analysis,
    }
}

/// Resolves the organization's current billing-cycle start, rolling the
/// cycle (and its usage counters) over if the previous cycle's end time has
/// passed: a cycle rolls over lazily on first read after its end time.
///
/// # Errors
///
/// Returns [`QuotaError::OrgNotFound`] if `org_id` doesn't exist, or
/// [`QuotaError::Database`] if persistence fails.
pub async fn current_cycle_start(
    orgs: &dyn OrgRepository,
    usage: &dyn UsageRepository,
    org_id: Uuid,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, QuotaError> {
    let org = orgs.get(org_id).await?.ok_or(QuotaError::OrgNotFound(org_id))?;
    let cycle_end = org.cycle_start + BILLING_CYCLE;
    if now < cycle_end {
        return Ok(org.cycle_start);
    }

    log::info!("quota cycle rollover: org_id={org_id} previous_start={}", org.cycle_start);
    usage.reset_cycle(org_id, now).await?;
    orgs.set_plan(org_id, org.plan, now).await?;
    Ok(now)
}

/// Checks and, if within limit, consumes one unit of `feature` for
/// `org_id` in its current billing cycle.
///
/// `key` scopes the counter below the org level — e.g. an analysis id for
/// [`QuotaFeature::RefineMessagesPerAnalysis`], `None` for org-wide
/// counters such as [`QuotaFeature::AnalysesCreated`].
///
/// # Errors
///
/// Returns [`QuotaError::OrgNotFound`] if `org_id` doesn't exist, or
/// [`QuotaError::Database`] if persistence fails.
pub async fn check_and_consume(
    orgs: &dyn OrgRepository,
    usage: &dyn UsageRepository,
    org_id: Uuid,
    feature: QuotaFeature,
    key: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<QuotaDecision, QuotaError> {
    let org = orgs.get(org_id).await?.ok_or(QuotaError::OrgNotFound(org_id))?;
    let period_start = current_cycle_start(orgs, usage, org_id, now).await?;
    let limit = limit_for(org.plan, feature);

    let outcome = usage.check_and_consume(org_id, feature, key, limit, period_start).await?;
    Ok(match outcome {
        QuotaOutcome::Allowed { used } => QuotaDecision::Allowed { used, limit },
        QuotaOutcome::Denied { used } => {
            let org_id_str = org_id.to_string();
            log_event(
                log::Level::Info,
                &LogEvent { org_id: Some(org_id_str.as_str()), ..LogEvent::new(events::QUOTA_DENIED) },
            );
            QuotaDecision::Denied { used, limit, upgrade_target: org.plan.upgrade_target() }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseforge_domain::AgentName;

    #[test]
    fn free_plan_may_not_use_financial_agent() {
        assert!(!may_use_agent(Plan::Free, AgentName::Financial));
    }

    #[test]
    fn pro_plan_may_use_every_agent() {
        for agent in AgentName::ALL {
            assert!(may_use_agent(Plan::Pro, agent));
        }
    }

    #[test]
    fn free_plan_may_not_export_pdf() {
        assert!(!may_export(Plan::Free, caseforge_domain::ExportFormat::Pdf));
    }

    #[test]
    fn limit_for_analyses_created_matches_plan_definition() {
        assert_eq!(limit_for(Plan::Free, QuotaFeature::AnalysesCreated), Limit::Bounded(5));
        assert_eq!(limit_for(Plan::Enterprise, QuotaFeature::AnalysesCreated), Limit::Unbounded);
    }

    #[test]
    fn limit_for_refine_messages_matches_plan_definition() {
        assert_eq!(limit_for(Plan::Pro, QuotaFeature::RefineMessagesPerAnalysis), Limit::Bounded(20));
    }
}
