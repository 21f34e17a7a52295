#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-analysis refinement chat.
//!
//! Refinement is deliberately simple next to the orchestrator: one LLM
//! call, grounded in the completed analysis's reviewer output and the
//! conversation so far, serialized per analysis so replies never interleave.

pub mod locks;

use std::time::{Duration, Instant};

use caseforge_ai::providers::{CompletionProvider, ProviderError};
use caseforge_database::{
    AgentOutputRepository, AnalysisRepository, DbError, OrgRepository, RefineRepository, UsageRepository,
};
use caseforge_database_models::NewRefineMessage;
use caseforge_domain::{AgentName, AnalysisStatus, Limit, Plan, QuotaFeature, RefineRole};
use caseforge_observability::{events, log_event, LogEvent};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use locks::RefineLocks;

const REFINE_MODEL: &str = AgentName::Reviewer.default_model();
const MAX_HISTORY_MESSAGES: u32 = 20;
const MAX_CONTEXT_CHARS: usize = 8_000;
const MAX_OUTPUT_TOKENS: u32 = 2_048;
const CALL_TIMEOUT: Duration = Duration::from_secs(25);

const SYSTEM_PROMPT: &str = "You are refining a completed business analysis. \
Answer the user's follow-up using only the grounding context provided. \
If the answer isn't supported by the analysis, say so rather than inventing facts.";

/// Errors from a refine call.
#[derive(Debug, Error)]
pub enum RefineError {
    /// No analysis with that id exists for the given organization.
    #[error("analysis not found")]
    AnalysisNotFound,
    /// The analysis exists but hasn't reached `completed`.
    #[error("analysis is not completed")]
    AnalysisNotCompleted,
    /// The organization doesn't exist (should be unreachable once an
    /// analysis has already been resolved for it).
    #[error("organization not found")]
    OrgNotFound,
    /// The refine-messages-per-analysis quota was exhausted.
    #[error("refine message quota exceeded")]
    QuotaExceeded {
        /// Messages sent so far this cycle.
        used: i64,
        /// The plan's limit.
        limit: Limit,
        /// Messages remaining, `-1` if unbounded.
        remaining: i64,
        /// The plan one tier up, if any.
        upgrade_target: Option<Plan>,
    },
    /// The completion provider failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    /// Persistence failed.
    #[error("database error: {0}")]
    Database(#[from] DbError),
}

/// A successful refine turn.
#[derive(Debug, Clone)]
pub struct RefineOutcome {
    /// The assistant's reply text.
    pub message: String,
    /// Messages consumed this cycle, including this one.
    pub used: i64,
    /// The plan's limit.
    pub limit: Limit,
    /// Messages remaining, `-1` if unbounded.
    pub remaining: i64,
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}\n[truncated]")
}

fn compose_user_message(
    problem_description: &str,
    reviewer_output: &str,
    history: &[caseforge_database_models::RefineMessageRow],
    new_message: &str,
) -> String {
    let mut parts = vec![
        format!("Original problem:\n{}", truncate(problem_description, MAX_CONTEXT_CHARS)),
        format!("Analysis summary:\n{}", truncate(reviewer_output, MAX_CONTEXT_CHARS)),
    ];
    if !history.is_empty() {
        let mut turns = String::from("Prior conversation:\n");
        for row in history {
            let speaker = match row.role {
                RefineRole::User => "User",
                RefineRole::Assistant => "Assistant",
            };
            turns.push_str(&format!("{speaker}: {}\n", row.content));
        }
        parts.push(turns);
    }
    parts.push(format!("New question:\n{new_message}"));
    parts.join("\n\n")
}

/// Runs one refinement turn for `analysis_id` under `org_id`.
///
/// Obtains the analysis's per-id lock for the duration of the call so two
/// concurrent refine requests for the same analysis serialize.
///
/// # Errors
///
/// See [`RefineError`] variants.
#[allow(clippy::too_many_arguments)]
pub async fn refine(
    locks: &RefineLocks,
    orgs: &dyn OrgRepository,
    analyses: &dyn AnalysisRepository,
    agent_outputs: &dyn AgentOutputRepository,
    refine_messages: &dyn RefineRepository,
    usage: &dyn UsageRepository,
    provider: &dyn CompletionProvider,
    org_id: Uuid,
    analysis_id: Uuid,
    user_message: &str,
    now: DateTime<Utc>,
) -> Result<RefineOutcome, RefineError> {
    let _guard = locks.lock(analysis_id).await;

    let analysis = analyses.get(org_id, analysis_id).await?.ok_or(RefineError::AnalysisNotFound)?;
    if analysis.status != AnalysisStatus::Completed {
        return Err(RefineError::AnalysisNotCompleted);
    }

    let decision =
        caseforge_quota::check_and_consume(orgs, usage, org_id, QuotaFeature::RefineMessagesPerAnalysis, Some(analysis_id), now)
            .await
            .map_err(|e| match e {
                caseforge_quota::QuotaError::OrgNotFound(_) => RefineError::OrgNotFound,
                caseforge_quota::QuotaError::Database(db) => RefineError::Database(db),
            })?;

    let (used, limit) = match decision {
        caseforge_quota::QuotaDecision::Allowed { used, limit } => (used, limit),
        caseforge_quota::QuotaDecision::Denied { used, limit, upgrade_target } => {
            return Err(RefineError::QuotaExceeded { used, limit, remaining: 0, upgrade_target });
        }
    };
    let remaining = match limit {
        Limit::Bounded(max) => (max - used).max(0),
        Limit::Unbounded => -1,
    };

    let history = refine_messages.list(org_id, analysis_id, MAX_HISTORY_MESSAGES).await?;
    let reviewer_output = agent_outputs
        .list(analysis_id)
        .await?
        .into_iter()
        .find(|row| row.agent_name == AgentName::Reviewer)
        .map(|row| row.output_text)
        .unwrap_or_default();

    let composed = compose_user_message(&analysis.problem_description, &reviewer_output, &history, user_message);

    refine_messages
        .append(NewRefineMessage {
            id: Uuid::new_v4(),
            analysis_id,
            org_id,
            role: RefineRole::User,
            content: user_message.to_string(),
            tokens: 0,
        })
        .await?;

    let deadline = Instant::now() + CALL_TIMEOUT;
    log::info!("refine call starting: analysis_id={analysis_id}");
    let completion = provider.complete(SYSTEM_PROMPT, &composed, REFINE_MODEL, MAX_OUTPUT_TOKENS, deadline).await?;

    let total_tokens = completion.input_tokens + completion.output_tokens;
    refine_messages
        .append(NewRefineMessage {
            id: Uuid::new_v4(),
            analysis_id,
            org_id,
            role: RefineRole::Assistant,
            content: completion.text.clone(),
            tokens: total_tokens,
        })
        .await?;

    log_event(
        log::Level::Info,
        &LogEvent { tokens: Some(total_tokens as u64), ..LogEvent::new(events::AGENT_COMPLETED) },
    );

    Ok(RefineOutcome { message: completion.text, used, limit, remaining })
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseforge_database_models::RefineMessageRow;

    #[test]
    fn truncate_leaves_short_text_untouched() {
        assert_eq!(truncate("hello", 100), "hello");
    }

    #[test]
    fn truncate_marks_long_text() {
        let long = "a".repeat(10);
        let result = truncate(&long, 5);
        assert!(result.ends_with("[truncated]"));
    }

    #[test]
    fn compose_includes_prior_turns() {
        let row = RefineMessageRow {
            id: Uuid::new_v4(),
            analysis_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            role: RefineRole::User,
            content: "what about competitors?".to_string(),
            tokens: 0,
            created_at: Utc::now(),
        };
        let composed = compose_user_message("problem", "summary", std::slice::from_ref(&row), "and now?");
        assert!(composed.contains("what about competitors?"));
        assert!(composed.contains("and now?"));
    }

    #[test]
    fn compose_omits_history_section_when_empty() {
        let composed = compose_user_message("problem", "summary", &[], "first question");
        assert!(!composed.contains("Prior conversation"));
    }
}
