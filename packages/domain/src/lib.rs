#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared domain vocabulary for the business analysis backend.
//!
//! These are the enums and small value types that every other crate in the
//! workspace needs a copy of: plan limits, analysis/agent/job lifecycles,
//! and the five-agent taxonomy. Keeping them dependency-free avoids a cycle
//! between the persistence, orchestration, and API layers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Subscription tier for an organization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Plan {
    /// Free tier: limited analyses, limited agent set, markdown export only.
    Free,
    /// Pro tier: all agents, more analyses, pdf export.
    Pro,
    /// Enterprise tier: unbounded analyses/refinements, every export format.
    Enterprise,
}

/// A resource limit that is either a fixed ceiling or unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// A fixed, positive ceiling per billing cycle.
    Bounded(i64),
    /// No ceiling (plan's `-1` sentinel).
    Unbounded,
}

impl Limit {
    /// Returns `true` if `used` has reached or passed this limit.
    #[must_use]
    pub const fn is_reached(self, used: i64) -> bool {
        match self {
            Self::Bounded(max) => used >= max,
            Self::Unbounded => false,
        }
    }

    /// The numeric limit as sent to clients, `-1` for unbounded.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Bounded(n) => n,
            Self::Unbounded => -1,
        }
    }
}

/// Export format gated by plan.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExportFormat {
    /// Markdown export.
    Md,
    /// PDF export.
    Pdf,
    /// Word document export.
    Docx,
    /// PowerPoint export.
    Pptx,
}

/// Static plan definition: quotas and feature gates.
///
/// These tables are the single centralized source of plan limits; nothing
/// else in the workspace hardcodes a plan limit.
#[derive(Debug, Clone, Copy)]
pub struct PlanDefinition {
    /// The plan this definition describes.
    pub plan: Plan,
    /// Analyses allowed per 30-day billing cycle.
    pub analyses_per_cycle: Limit,
    /// Agents this plan's analyses run (subset of [`AgentName::ALL`]).
    pub enabled_agents: &'static [AgentName],
    /// Refine messages allowed per analysis.
    pub refine_messages_per_analysis: Limit,
    /// Export formats this plan may use.
    pub export_formats: &'static [ExportFormat],
}

/// Plan definition table, indexed by [`Plan::as_index`].
pub static PLAN_DEFINITIONS: [PlanDefinition; 3] = [
    PlanDefinition {
        plan: Plan::Free,
        analyses_per_cycle: Limit::Bounded(5),
        enabled_agents: &[AgentName::Analyst, AgentName::Commercial, AgentName::Reviewer],
        refine_messages_per_analysis: Limit::Bounded(3),
        export_formats: &[ExportFormat::Md],
    },
    PlanDefinition {
        plan: Plan::Pro,
        analyses_per_cycle: Limit::Bounded(50),
        enabled_agents: &AgentName::ALL,
        refine_messages_per_analysis: Limit::Bounded(20),
        export_formats: &[ExportFormat::Md, ExportFormat::Pdf],
    },
    PlanDefinition {
        plan: Plan::Enterprise,
        analyses_per_cycle: Limit::Unbounded,
        enabled_agents: &AgentName::ALL,
        refine_messages_per_analysis: Limit::Unbounded,
        export_formats: &[ExportFormat::Md, ExportFormat::Pdf, ExportFormat::Docx, ExportFormat::Pptx],
    },
];

impl Plan {
    /// Looks up this plan's static [`PlanDefinition`].
    #[must_use]
    pub fn definition(self) -> &'static PlanDefinition {
        PLAN_DEFINITIONS
            .iter()
            .find(|d| d.plan == self)
            .expect("every Plan variant has a PlanDefinition")
    }

    /// Whether this plan may use the given export format.
    #[must_use]
    pub fn may_export(self, format: ExportFormat) -> bool {
        self.definition().export_formats.contains(&format)
    }

    /// Whether this plan's analyses include the given agent.
    #[must_use]
    pub fn may_use_agent(self, agent: AgentName) -> bool {
        self.definition().enabled_agents.contains(&agent)
    }

    /// The plan one tier above this one, suggested on quota denial.
    ///
    /// `None` for [`Plan::Enterprise`], which has no ceiling to upgrade past.
    #[must_use]
    pub const fn upgrade_target(self) -> Option<Self> {
        match self {
            Self::Free => Some(Self::Pro),
            Self::Pro => Some(Self::Enterprise),
            Self::Enterprise => None,
        }
    }
}

/// A user's role within their organization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// The organization's original creator.
    Owner,
    /// Can manage billing and members but did not create the org.
    Admin,
    /// Ordinary member: can create and view analyses.
    Member,
}

/// Lifecycle status of an [`Analysis`](crate) row.
///
/// Monotone along `Pending -> Running -> (Completed | Failed)`; never
/// transitions backward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AnalysisStatus {
    /// Enqueued, not yet picked up by a worker.
    Pending,
    /// A worker is actively orchestrating agents.
    Running,
    /// Orchestration finished; reviewer produced output (possibly with
    /// `partial_failure` on some non-reviewer agent).
    Completed,
    /// Orchestration finished without a usable reviewer output.
    Failed,
}

/// The enumerated business domain an analysis problem is framed against.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BusinessType {
    /// Software-as-a-service.
    Saas,
    /// Direct-to-consumer or retail commerce.
    Retail,
    /// Physical goods manufacturing.
    Manufacturing,
    /// Healthcare and life sciences.
    Healthcare,
    /// Financial services.
    Finance,
    /// Anything not covered above.
    Other,
}

/// Requested analysis depth, trading thoroughness for latency/cost.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Depth {
    /// Fastest, least thorough.
    Fast,
    /// Default depth.
    Standard,
    /// Slowest, most thorough.
    Deep,
}

impl Depth {
    /// A short human-readable description substituted into agent prompts
    /// as the `depth_description` template variable.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Fast => "a quick pass focused on the single highest-priority finding",
            Self::Standard => "a balanced analysis covering the main drivers and trade-offs",
            Self::Deep => "an exhaustive analysis exploring second-order effects and alternatives",
        }
    }
}

/// One of the five fixed specialist agents.
///
/// Dependencies and the per-call timeout are static configuration; see
/// [`AgentName::dependencies`] and [`AgentName::timeout`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgentName {
    /// Frames the problem, lists hypotheses. No dependencies.
    Analyst,
    /// Commercial proposals. Depends on `analyst`.
    Commercial,
    /// Market benchmarks and trends. Depends on `analyst`.
    Market,
    /// Viability and ROI. Depends on `analyst`, `commercial`.
    Financial,
    /// Executive consolidation. Depends on all other agents.
    Reviewer,
}

impl AgentName {
    /// All five agents, in no particular order (the DAG resolver computes
    /// execution order).
    pub const ALL: [Self; 5] = [
        Self::Analyst,
        Self::Commercial,
        Self::Market,
        Self::Financial,
        Self::Reviewer,
    ];

    /// The agent's declared dependencies.
    #[must_use]
    pub const fn dependencies(self) -> &'static [Self] {
        match self {
            Self::Analyst => &[],
            Self::Commercial | Self::Market => &[Self::Analyst],
            Self::Financial => &[Self::Analyst, Self::Commercial],
            Self::Reviewer => &[Self::Analyst, Self::Commercial, Self::Market, Self::Financial],
        }
    }

    /// Per-call timeout, overridable in config but defaulting to 30s
    /// uniformly across agents.
    #[must_use]
    pub const fn default_timeout(self) -> Duration {
        Duration::from_secs(30)
    }

    /// The model identifier this agent calls by default.
    ///
    /// Centralized here so the rate table in `caseforge_ai` can key off the
    /// same strings without a second source of truth.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Analyst | Self::Reviewer => "claude-sonnet-4-20250514",
            Self::Commercial | Self::Market | Self::Financial => "claude-haiku-4-20250514",
        }
    }
}

/// Lifecycle status of one agent's execution within an analysis.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgentStatus {
    /// Not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Finished with usable output.
    Completed,
    /// Exceeded its per-call timeout.
    Timeout,
    /// Failed (fatal provider error, or retries exhausted).
    Failed,
    /// Reserved for a future skip-on-unavailable-ancestor policy; current
    /// policy always degrades instead.
    Skipped,
}

impl AgentStatus {
    /// Whether this status makes the agent's output unavailable to
    /// downstream agents (sentinel substitution applies).
    #[must_use]
    pub const fn is_unavailable(self) -> bool {
        matches!(self, Self::Failed | Self::Timeout | Self::Skipped)
    }
}

/// Aggregate outcome of one full orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Every agent completed.
    Completed,
    /// Reviewer completed but at least one other agent did not.
    PartialFailure,
    /// Reviewer did not complete.
    Failed,
}

/// Role of a single message in a refinement conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RefineRole {
    /// A message from the end user.
    User,
    /// A model-generated reply.
    Assistant,
}

/// Durable job lifecycle status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    /// Enqueued, waiting for a worker.
    Queued,
    /// Dequeued and currently being processed.
    Running,
    /// Processing reached a terminal, successful state.
    Done,
    /// Attempts exhausted (spec: max 3).
    Failed,
}

/// Counted quota features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum QuotaFeature {
    /// Number of analyses created this cycle.
    AnalysesCreated,
    /// Number of refine messages sent for one analysis.
    RefineMessagesPerAnalysis,
}

/// Length of a billing cycle: a 30-day window.
pub const BILLING_CYCLE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Workspace-wide classification of error locality, used to pick an HTTP
/// status/log treatment without each crate re-deriving the same mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Request failed schema/range validation.
    InvalidInput,
    /// Missing or invalid bearer token.
    Unauthenticated,
    /// Authenticated, but the request targets another tenant's data.
    TenantMismatch,
    /// Resource does not exist (or is invisible to this tenant).
    NotFound,
    /// Plan quota exhausted.
    QuotaExceeded,
    /// Rate limit exceeded.
    RateLimited,
    /// Transient LLM provider error; retried internally, never surfaced.
    ProviderRetryable,
    /// Fatal LLM provider error; the owning agent fails, analysis may still
    /// complete.
    ProviderFatal,
    /// Agent exceeded its per-call timeout.
    AgentTimeout,
    /// Persistence layer temporarily unavailable (pool exhaustion, etc).
    StoreBusy,
    /// Unexpected failure; detail goes to logs only.
    Infrastructure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_plan_caps_agents_at_three() {
        let def = Plan::Free.definition();
        assert_eq!(def.enabled_agents.len(), 3);
        assert!(Plan::Free.may_use_agent(AgentName::Analyst));
        assert!(!Plan::Free.may_use_agent(AgentName::Financial));
    }

    #[test]
    fn enterprise_is_unbounded() {
        assert_eq!(Limit::Unbounded.as_i64(), -1);
        assert!(!Limit::Unbounded.is_reached(i64::MAX));
    }

    #[test]
    fn bounded_limit_reached_at_ceiling() {
        let limit = Limit::Bounded(5);
        assert!(!limit.is_reached(4));
        assert!(limit.is_reached(5));
        assert!(limit.is_reached(6));
    }

    #[test]
    fn reviewer_depends_on_every_other_agent() {
        let deps = AgentName::Reviewer.dependencies();
        assert_eq!(deps.len(), 4);
        assert!(deps.contains(&AgentName::Analyst));
        assert!(deps.contains(&AgentName::Financial));
    }

    #[test]
    fn upgrade_target_chain() {
        assert_eq!(Plan::Free.upgrade_target(), Some(Plan::Pro));
        assert_eq!(Plan::Pro.upgrade_target(), Some(Plan::Enterprise));
        assert_eq!(Plan::Enterprise.upgrade_target(), None);
    }

    #[test]
    fn agent_status_unavailable_classification() {
        assert!(AgentStatus::Failed.is_unavailable());
        assert!(AgentStatus::Timeout.is_unavailable());
        assert!(!AgentStatus::Completed.is_unavailable());
        assert!(!AgentStatus::Pending.is_unavailable());
    }
}
