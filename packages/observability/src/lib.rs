#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Structured JSON logging.
//!
//! Wraps `env_logger` (the same facade the rest of the workspace uses via
//! `log::info!`/`log::warn!`/`log::error!`) with a formatter that emits one
//! JSON object per line instead of `env_logger`'s default plain-text style.
//! Call sites that need the fixed field set build a
//! [`LogEvent`] and pass it to [`log_event`]; everything else keeps using
//! the plain `log` macros, which still pass through as JSON (just with an
//! empty structured-field set).

use std::io::Write as _;

use serde::Serialize;

/// One of the fixed event names the orchestrator and API surface emit.
///
/// Kept as `&'static str` rather than an enum so call sites can log
/// ad-hoc events too; these constants just prevent typos for the ones the
/// spec names explicitly.
pub mod events {
    /// Orchestrator run started.
    pub const EXECUTION_STARTED: &str = "execution_started";
    /// DAG layering computed for this run.
    pub const EXECUTION_PLAN: &str = "execution_plan";
    /// A DAG layer began executing.
    pub const LAYER_STARTED: &str = "layer_started";
    /// A DAG layer finished, every agent settled successfully.
    pub const LAYER_COMPLETED: &str = "layer_completed";
    /// A DAG layer finished with at least one non-completed agent.
    pub const LAYER_COMPLETED_WITH_FAILURES: &str = "layer_completed_with_failures";
    /// One agent task started.
    pub const AGENT_STARTED: &str = "agent_started";
    /// One agent task completed successfully.
    pub const AGENT_COMPLETED: &str = "agent_completed";
    /// One agent task hit its timeout.
    pub const AGENT_TIMEOUT: &str = "agent_timeout";
    /// One agent task failed (fatal or retries exhausted).
    pub const AGENT_FAILED: &str = "agent_failed";
    /// Orchestrator run finished with every agent completed.
    pub const EXECUTION_COMPLETED: &str = "execution_completed";
    /// Orchestrator run finished with reviewer output but partial coverage.
    pub const EXECUTION_PARTIAL_FAILURE: &str = "execution_partial_failure";
    /// Orchestrator run finished without usable reviewer output.
    pub const EXECUTION_FAILED: &str = "execution_failed";
    /// A quota check denied a request.
    pub const QUOTA_DENIED: &str = "quota_denied";
    /// A request's claimed tenant did not match its resolved context.
    pub const TENANT_MISMATCH: &str = "tenant_mismatch";
    /// The worker startup/periodic sweep reclaimed an orphaned analysis.
    pub const WORKER_SWEEP_RECLAIMED: &str = "worker_sweep_reclaimed";
}

/// The fixed structured field set this crate's JSON log lines use.
///
/// All fields besides `event` are optional; omit whatever doesn't apply to
/// a given log line.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogEvent<'a> {
    /// One of the names in [`events`], or a custom event identifier.
    pub event: &'a str,
    /// The orchestrator run this line belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<&'a str>,
    /// The tenant this line concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<&'a str>,
    /// The agent this line concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<&'a str>,
    /// Duration of the operation this line reports on, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Total tokens (input + output) consumed, if applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    /// Cost in USD, if applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    /// A status string (e.g. `"completed"`, `"timeout"`), if applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'a str>,
    /// A user-safe error description, if this line reports a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

impl<'a> LogEvent<'a> {
    /// Starts a new event with just the event name set.
    #[must_use]
    pub fn new(event: &'a str) -> Self {
        Self {
            event,
            ..Self::default()
        }
    }
}

#[derive(Serialize)]
struct WireRecord<'a> {
    timestamp: String,
    level: &'a str,
    message: &'a str,
}

/// Emits a [`LogEvent`] at `info` level.
///
/// The event is embedded as the `message` field's raw JSON so the overall
/// log line stays valid JSON with `timestamp`/`level` hoisted to the top
/// and every [`LogEvent`] field flattened alongside them.
pub fn log_event(level: log::Level, event: &LogEvent<'_>) {
    match serde_json::to_string(event) {
        Ok(json) => log::log!(level, "{json}"),
        Err(e) => log::error!("failed to serialize log event: {e}"),
    }
}

/// Installs the JSON-line `env_logger` formatter.
///
/// Reads the level from `RUST_LOG`, falling back to `LOG_LEVEL`, falling
/// back to `info`. Safe to call once at process startup in both the server
/// and worker binaries.
pub fn init() {
    let filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| "info".to_string());

    env_logger::Builder::new()
        .parse_filters(&filter)
        .format(|buf, record| {
            let timestamp = chrono::Utc::now().to_rfc3339();
            let msg = record.args().to_string();

            // If the message is already a JSON object (from `log_event`),
            // splice timestamp/level into it instead of double-wrapping.
            if let Ok(mut value) = serde_json::from_str::<serde_json::Value>(&msg) {
                if let serde_json::Value::Object(ref mut map) = value {
                    map.insert("timestamp".to_string(), serde_json::Value::String(timestamp));
                    map.insert(
                        "level".to_string(),
                        serde_json::Value::String(record.level().to_string()),
                    );
                    return writeln!(buf, "{value}");
                }
            }

            let wire = WireRecord {
                timestamp,
                level: record.level().as_str(),
                message: &msg,
            };
            writeln!(buf, "{}", serde_json::to_string(&wire).unwrap_or(msg))
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_event_serializes_only_set_fields() {
        let event = LogEvent {
            event: events::AGENT_COMPLETED,
            agent_name: Some("analyst"),
            duration_ms: Some(1200),
            ..LogEvent::new(events::AGENT_COMPLETED)
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"agent_completed\""));
        assert!(json.contains("\"agent_name\":\"analyst\""));
        assert!(!json.contains("org_id"));
    }
}
