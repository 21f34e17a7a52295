//! In-memory execution state for one orchestrator run.
//!
//! Owned exclusively by the worker processing the analysis; never shared
//! across workers or persisted directly. The orchestrator records into it
//! and the caller serializes the final state into database rows.

use std::collections::HashMap;
use std::time::Instant;

use caseforge_domain::{AgentName, AgentStatus, BusinessType, Depth};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Per-agent execution bookkeeping.
#[derive(Debug, Clone)]
pub struct AgentMetadata {
    /// Current lifecycle status.
    pub status: AgentStatus,
    /// Wall-clock start, set when the agent transitions to `running`.
    pub start: Option<Instant>,
    /// Wall-clock end, set on any terminal status.
    pub end: Option<Instant>,
    /// Prompt tokens billed.
    pub input_tokens: i64,
    /// Completion tokens billed.
    pub output_tokens: i64,
    /// Computed USD cost for this agent's call(s), including retries.
    pub cost_usd: f64,
    /// Populated on `failed` / `timeout`.
    pub error: Option<String>,
}

impl Default for AgentMetadata {
    fn default() -> Self {
        Self {
            status: AgentStatus::Pending,
            start: None,
            end: None,
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
            error: None,
        }
    }
}

/// The full state of one orchestrator run.
pub struct ExecutionContext {
    /// Unique id for this run, independent of the eventual analysis row id
    /// so the orchestrator stays persistence-agnostic.
    pub execution_id: Uuid,
    /// The problem statement being analyzed.
    pub problem_text: String,
    /// The business type the analysis is framed against.
    pub business_type: BusinessType,
    /// Requested thoroughness.
    pub depth: Depth,
    /// Optional industry hint, substituted into templates that use it.
    pub industry: Option<String>,
    /// Each agent's rendered output text, present once it has run.
    pub outputs: HashMap<AgentName, String>,
    /// Per-agent status/timing/cost bookkeeping.
    pub metadata: HashMap<AgentName, AgentMetadata>,
    /// When this context was constructed.
    pub created_at: DateTime<Utc>,
    /// Set by the orchestrator at the start of `execute`.
    pub started_at: Option<DateTime<Utc>>,
    /// Set by the orchestrator once every layer has settled.
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionContext {
    /// Builds a fresh context with every agent defaulted to `pending`.
    #[must_use]
    pub fn new(
        problem_text: String,
        business_type: BusinessType,
        depth: Depth,
        industry: Option<String>,
    ) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            problem_text,
            business_type,
            depth,
            industry,
            outputs: HashMap::new(),
            metadata: AgentName::ALL.iter().map(|a| (*a, AgentMetadata::default())).collect(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Reads an agent's output, if it has produced one.
    #[must_use]
    pub fn output(&self, agent: AgentName) -> Option<&str> {
        self.outputs.get(&agent).map(String::as_str)
    }

    /// An agent's current metadata, defaulting to `pending` if not yet
    /// touched (every agent is pre-populated by [`Self::new`], so this
    /// never actually falls through to the default).
    #[must_use]
    pub fn metadata(&self, agent: AgentName) -> AgentMetadata {
        self.metadata.get(&agent).cloned().unwrap_or_default()
    }

    /// Records a completed or failed agent run in one call: output text,
    /// metadata, both together. No separate write paths exist, so there is
    /// no intermediate state a concurrent reader could observe split.
    pub fn record(&mut self, agent: AgentName, output: String, metadata: AgentMetadata) {
        self.outputs.insert(agent, output);
        self.metadata.insert(agent, metadata);
    }

    /// Sums tokens/cost across every agent and derives wall-clock latency
    /// as `max(end) - min(start)` over agents that actually ran.
    #[must_use]
    pub fn aggregates(&self) -> Aggregates {
        let mut input_tokens = 0;
        let mut output_tokens = 0;
        let mut cost_usd = 0.0;
        let mut earliest_start: Option<Instant> = None;
        let mut latest_end: Option<Instant> = None;

        for meta in self.metadata.values() {
            input_tokens += meta.input_tokens;
            output_tokens += meta.output_tokens;
            cost_usd += meta.cost_usd;
            if let Some(start) = meta.start {
                earliest_start = Some(earliest_start.map_or(start, |e: Instant| e.min(start)));
            }
            if let Some(end) = meta.end {
                latest_end = Some(latest_end.map_or(end, |l: Instant| l.max(end)));
            }
        }

        let latency_ms = match (earliest_start, latest_end) {
            (Some(start), Some(end)) => end.saturating_duration_since(start).as_millis() as i64,
            _ => 0,
        };

        Aggregates {
            input_tokens,
            output_tokens,
            cost_usd,
            latency_ms,
        }
    }
}

/// Summed totals across every agent in an [`ExecutionContext`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregates {
    /// Sum of every agent's prompt tokens.
    pub input_tokens: i64,
    /// Sum of every agent's completion tokens.
    pub output_tokens: i64,
    /// Sum of every agent's computed cost.
    pub cost_usd: f64,
    /// `max(end) - min(start)` across agents that ran, in milliseconds.
    pub latency_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_defaults_every_agent_to_pending() {
        let ctx = ExecutionContext::new("problem".to_string(), BusinessType::Saas, Depth::Standard, None);
        for agent in AgentName::ALL {
            assert_eq!(ctx.metadata(agent).status, AgentStatus::Pending);
        }
    }

    #[test]
    fn record_updates_output_and_metadata_together() {
        let mut ctx = ExecutionContext::new("p".to_string(), BusinessType::Retail, Depth::Fast, None);
        let mut meta = AgentMetadata::default();
        meta.status = AgentStatus::Completed;
        meta.input_tokens = 100;
        meta.output_tokens = 50;
        meta.cost_usd = 0.01;
        ctx.record(AgentName::Analyst, "hypotheses".to_string(), meta);

        assert_eq!(ctx.output(AgentName::Analyst), Some("hypotheses"));
        assert_eq!(ctx.metadata(AgentName::Analyst).status, AgentStatus::Completed);
    }

    #[test]
    fn aggregates_sum_tokens_and_cost_across_agents() {
        let mut ctx = ExecutionContext::new("p".to_string(), BusinessType::Finance, Depth::Deep, None);
        for (agent, tokens) in [(AgentName::Analyst, 100), (AgentName::Commercial, 200)] {
            let mut meta = AgentMetadata::default();
            meta.input_tokens = tokens;
            meta.output_tokens = tokens / 2;
            meta.cost_usd = tokens as f64 * 0.001;
            ctx.record(agent, String::new(), meta);
        }
        let agg = ctx.aggregates();
        assert_eq!(agg.input_tokens, 300);
        assert_eq!(agg.output_tokens, 150);
        assert!((agg.cost_usd - 0.3).abs() < 1e-9);
    }

    #[test]
    fn aggregates_latency_is_zero_when_nothing_ran() {
        let ctx = ExecutionContext::new("p".to_string(), BusinessType::Other, Depth::Standard, None);
        assert_eq!(ctx.aggregates().latency_ms, 0);
    }
}
