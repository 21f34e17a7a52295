//! Runs one analysis's agent graph to completion.
//!
//! Agents within a layer run concurrently via `tokio::spawn`; a failing
//! sibling never cancels the others (gather-with-exceptions). Retries and
//! timeouts are owned entirely by this module — [`providers::CompletionProvider`]
//! implementations only ever see one call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use caseforge_domain::{AgentName, AgentStatus, ExecutionOutcome};
use caseforge_observability::{events, log_event, LogEvent};
use chrono::Utc;

use crate::context::{AgentMetadata, ExecutionContext};
use crate::dag;
use crate::providers::{cost_usd, CompletionProvider};
use crate::templates::{variables_for, TemplateStore};
use crate::AiError;

const MAX_DEP_CHARS: usize = 8_000;
const MAX_RETRIES: u32 = 2;
const RETRY_BASE: Duration = Duration::from_millis(500);
const RETRY_CAP: Duration = Duration::from_secs(4);
const MAX_OUTPUT_TOKENS: u32 = 4_096;

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}\n[truncated]")
}

fn build_user_message(agent: AgentName, problem_text: &str, ctx: &ExecutionContext) -> String {
    let mut message = problem_text.to_string();
    for dep in agent.dependencies() {
        message.push_str("\n\n---\n");
        message.push_str(&dep.to_string());
        message.push_str(":\n");
        let meta = ctx.metadata(*dep);
        if meta.status.is_unavailable() {
            message.push_str(&format!("[unavailable: {dep} failed]"));
        } else {
            message.push_str(&truncate(ctx.output(*dep).unwrap_or(""), MAX_DEP_CHARS));
        }
    }
    message
}

fn backoff_delay(attempt: u32) -> Duration {
    let scaled = RETRY_BASE.saturating_mul(1 << attempt);
    scaled.min(RETRY_CAP)
}

async fn call_with_retry(
    provider: &dyn CompletionProvider,
    system_prompt: &str,
    user_message: &str,
    model: &str,
    deadline: Instant,
) -> Result<(String, i64, i64), AgentMetadata> {
    let mut last_error = String::new();
    for attempt in 0..=MAX_RETRIES {
        match provider
            .complete(system_prompt, user_message, model, MAX_OUTPUT_TOKENS, deadline)
            .await
        {
            Ok(completion) => {
                return Ok((completion.text, completion.input_tokens, completion.output_tokens));
            }
            Err(err) => {
                last_error = err.message.clone();
                if !err.kind.is_retryable() || attempt == MAX_RETRIES {
                    return Err(AgentMetadata {
                        status: AgentStatus::Failed,
                        error: Some(last_error),
                        ..AgentMetadata::default()
                    });
                }
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }
    }
    Err(AgentMetadata {
        status: AgentStatus::Failed,
        error: Some(last_error),
        ..AgentMetadata::default()
    })
}

struct AgentResult {
    agent: AgentName,
    output: String,
    metadata: AgentMetadata,
}

#[allow(clippy::too_many_arguments)]
async fn run_agent(
    agent: AgentName,
    execution_id: String,
    system_prompt: String,
    user_message: String,
    model: String,
    per_call_timeout: Duration,
    provider: Arc<dyn CompletionProvider>,
) -> AgentResult {
    let start = Instant::now();
    log_event(
        log::Level::Info,
        &LogEvent {
            execution_id: Some(&execution_id),
            agent_name: Some(agent.as_ref()),
            ..LogEvent::new(events::AGENT_STARTED)
        },
    );

    let deadline = start + per_call_timeout;
    let outcome = tokio::time::timeout(
        per_call_timeout,
        call_with_retry(provider.as_ref(), &system_prompt, &user_message, &model, deadline),
    )
    .await;

    let end = Instant::now();

    let (output, metadata) = match outcome {
        Ok(Ok((text, input_tokens, output_tokens))) => {
            let metadata = AgentMetadata {
                status: AgentStatus::Completed,
                start: Some(start),
                end: Some(end),
                input_tokens,
                output_tokens,
                cost_usd: cost_usd(&model, input_tokens, output_tokens),
                error: None,
            };
            log_event(
                log::Level::Info,
                &LogEvent {
                    execution_id: Some(&execution_id),
                    agent_name: Some(agent.as_ref()),
                    duration_ms: Some(end.saturating_duration_since(start).as_millis() as u64),
                    tokens: Some((input_tokens + output_tokens) as u64),
                    cost_usd: Some(metadata.cost_usd),
                    status: Some("completed"),
                    ..LogEvent::new(events::AGENT_COMPLETED)
                },
            );
            (text, metadata)
        }
        Ok(Err(mut failed)) => {
            failed.start = Some(start);
            failed.end = Some(end);
            log_event(
                log::Level::Warn,
                &LogEvent {
                    execution_id: Some(&execution_id),
                    agent_name: Some(agent.as_ref()),
                    status: Some("failed"),
                    error: failed.error.as_deref(),
                    ..LogEvent::new(events::AGENT_FAILED)
                },
            );
            (String::new(), failed)
        }
        Err(_elapsed) => {
            let metadata = AgentMetadata {
                status: AgentStatus::Timeout,
                start: Some(start),
                end: Some(end),
                error: Some(format!("timeout after {}s", per_call_timeout.as_secs())),
                ..AgentMetadata::default()
            };
            log_event(
                log::Level::Warn,
                &LogEvent {
                    execution_id: Some(&execution_id),
                    agent_name: Some(agent.as_ref()),
                    status: Some("timeout"),
                    ..LogEvent::new(events::AGENT_TIMEOUT)
                },
            );
            (String::new(), metadata)
        }
    };

    AgentResult {
        agent,
        output,
        metadata,
    }
}

/// Runs every enabled agent to completion, layer by layer.
///
/// `enabled_agents` is the plan's agent subset (see
/// [`caseforge_domain::PlanDefinition::enabled_agents`]); the orchestrator
/// never touches persistence, the caller stores the resulting `ctx`.
///
/// # Errors
///
/// Returns [`AiError::Dag`] if `enabled_agents` forms a cycle. Individual
/// agent failures never surface as an `Err` here; they are recorded into
/// `ctx`'s metadata and reflected in the returned [`ExecutionOutcome`].
pub async fn execute(
    ctx: &mut ExecutionContext,
    templates: &TemplateStore,
    provider: Arc<dyn CompletionProvider>,
    enabled_agents: &[AgentName],
) -> Result<ExecutionOutcome, AiError> {
    ctx.started_at = Some(Utc::now());
    let execution_id = ctx.execution_id.to_string();
    let plan = dag::layers(enabled_agents)?;

    log_event(
        log::Level::Info,
        &LogEvent {
            execution_id: Some(&execution_id),
            ..LogEvent::new(events::EXECUTION_STARTED)
        },
    );

    for layer in plan {
        log_event(
            log::Level::Info,
            &LogEvent {
                execution_id: Some(&execution_id),
                ..LogEvent::new(events::LAYER_STARTED)
            },
        );

        let variables = variables_for(ctx.business_type, ctx.depth, ctx.industry.clone());
        let mut handles = Vec::with_capacity(layer.len());
        for agent in layer {
            let system_prompt = templates.render(agent, &variables);
            let user_message = build_user_message(agent, &ctx.problem_text, ctx);
            let model = agent.default_model().to_string();
            let timeout = agent.default_timeout();
            let provider = Arc::clone(&provider);
            let execution_id = execution_id.clone();
            handles.push(tokio::spawn(run_agent(
                agent,
                execution_id,
                system_prompt,
                user_message,
                model,
                timeout,
                provider,
            )));
        }

        let mut any_failed = false;
        for handle in handles {
            match handle.await {
                Ok(result) => {
                    if result.metadata.status != AgentStatus::Completed {
                        any_failed = true;
                    }
                    ctx.record(result.agent, result.output, result.metadata);
                }
                Err(join_error) => {
                    // A panic inside the spawned task. Record it the same
                    // way a fatal provider error would be recorded so the
                    // rest of the layer's siblings are unaffected.
                    any_failed = true;
                    log::error!("agent task panicked: {join_error}");
                }
            }
        }

        log_event(
            log::Level::Info,
            &LogEvent {
                execution_id: Some(&execution_id),
                ..LogEvent::new(if any_failed {
                    events::LAYER_COMPLETED_WITH_FAILURES
                } else {
                    events::LAYER_COMPLETED
                })
            },
        );
    }

    ctx.completed_at = Some(Utc::now());

    let reviewer_completed = ctx.metadata(AgentName::Reviewer).status == AgentStatus::Completed;
    let all_completed = enabled_agents
        .iter()
        .all(|a| ctx.metadata(*a).status == AgentStatus::Completed);

    let outcome = if all_completed {
        ExecutionOutcome::Completed
    } else if reviewer_completed {
        ExecutionOutcome::PartialFailure
    } else {
        ExecutionOutcome::Failed
    };

    let event = match outcome {
        ExecutionOutcome::Completed => events::EXECUTION_COMPLETED,
        ExecutionOutcome::PartialFailure => events::EXECUTION_PARTIAL_FAILURE,
        ExecutionOutcome::Failed => events::EXECUTION_FAILED,
    };
    log_event(log::Level::Info, &LogEvent { execution_id: Some(&execution_id), ..LogEvent::new(event) });

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_text_untouched() {
        assert_eq!(truncate("short", 100), "short");
    }

    #[test]
    fn truncate_appends_marker_for_long_text() {
        let long = "a".repeat(10);
        let result = truncate(&long, 5);
        assert!(result.starts_with("aaaaa"));
        assert!(result.ends_with("[truncated]"));
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff_delay(0), Duration::from_millis(500));
        assert_eq!(backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(10), RETRY_CAP);
    }

    #[test]
    fn build_user_message_substitutes_sentinel_for_unavailable_dependency() {
        let mut ctx = ExecutionContext::new(
            "problem".to_string(),
            caseforge_domain::BusinessType::Saas,
            caseforge_domain::Depth::Standard,
            None,
        );
        ctx.record(
            AgentName::Analyst,
            String::new(),
            AgentMetadata {
                status: AgentStatus::Failed,
                ..AgentMetadata::default()
            },
        );
        let message = build_user_message(AgentName::Commercial, &ctx.problem_text, &ctx);
        assert!(message.contains("[unavailable: analyst failed]"));
    }

    #[test]
    fn build_user_message_includes_completed_dependency_output() {
        let mut ctx = ExecutionContext::new(
            "problem".to_string(),
            caseforge_domain::BusinessType::Saas,
            caseforge_domain::Depth::Standard,
            None,
        );
        ctx.record(
            AgentName::Analyst,
            "the hypotheses".to_string(),
            AgentMetadata {
                status: AgentStatus::Completed,
                ..AgentMetadata::default()
            },
        );
        let message = build_user_message(AgentName::Commercial, &ctx.problem_text, &ctx);
        assert!(message.contains("the hypotheses"));
    }
}
