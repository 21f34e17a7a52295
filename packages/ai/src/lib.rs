#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Prompt templates, completion provider adapters, the agent dependency
//! graph, and the orchestrator that runs one analysis's five agents.
//!
//! Deliberately persistence-free: callers hand in whatever context an agent
//! needs and get back in-memory results, leaving storage to `caseforge_database`.

pub mod context;
pub mod dag;
pub mod orchestrator;
pub mod providers;
pub mod templates;

use thiserror::Error;

/// Errors that can occur while rendering a template, calling a provider, or
/// orchestrating an analysis.
#[derive(Debug, Error)]
pub enum AiError {
    /// A prompt template referenced a variable not in [`templates::ALLOWED_VARIABLES`].
    #[error("template for {agent} references unknown variable {variable}")]
    UnknownTemplateVariable {
        /// The agent whose template is malformed.
        agent: caseforge_domain::AgentName,
        /// The offending `{{variable}}` name.
        variable: String,
    },

    /// The completion provider returned a non-retryable error.
    #[error("provider error: {0}")]
    Provider(#[from] providers::ProviderError),

    /// The DAG of enabled agents is malformed (cycle or missing dependency).
    #[error("dag error: {0}")]
    Dag(#[from] dag::DagError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_template_variable_displays_agent_and_name() {
        let err = AiError::UnknownTemplateVariable {
            agent: caseforge_domain::AgentName::Analyst,
            variable: "bogus".to_string(),
        };
        assert!(err.to_string().contains("bogus"));
        assert!(err.to_string().contains("analyst"));
    }
}
