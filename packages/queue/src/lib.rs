#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Two interchangeable job queue backends behind one contract.
//!
//! `InProcessQueue` is a bounded channel for single-node development;
//! `DistributedQueue` talks to an external queue service over HTTP with
//! visibility-timeout semantics. Callers never branch on which is active —
//! [`build`] picks one from [`caseforge_config::AppConfig::queue_backend`].

mod distributed;
mod in_process;

pub use distributed::DistributedQueue;
pub use in_process::InProcessQueue;

use std::time::Duration;

use caseforge_config::{AppConfig, QueueBackend};
use caseforge_domain::JobStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The only job type in scope.
pub const RUN_ANALYSIS: &str = "run_analysis";

/// Maximum delivery attempts before a job is marked `failed`.
pub const MAX_ATTEMPTS: u32 = 3;

/// Payload carried by a `run_analysis` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAnalysisPayload {
    /// The analysis to orchestrate.
    pub analysis_id: Uuid,
    /// The owning tenant.
    pub org_id: Uuid,
}

/// A job as dequeued by a worker.
#[derive(Debug, Clone)]
pub struct DequeuedJob {
    /// The durable job id.
    pub id: Uuid,
    /// Always [`RUN_ANALYSIS`] in scope.
    pub job_type: String,
    /// Decoded payload.
    pub payload: RunAnalysisPayload,
    /// How many times this job has been delivered, including this one.
    pub attempts: u32,
}

/// A point-in-time snapshot of a job's durable state.
#[derive(Debug, Clone)]
pub struct JobStatusSnapshot {
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Delivery attempts so far.
    pub attempts: u32,
    /// Error recorded by the most recent `nack`, if any.
    pub last_error: Option<String>,
}

/// Errors returned by a [`JobQueue`] implementation.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The job id is not known to this queue.
    #[error("job {0} not found")]
    NotFound(Uuid),
    /// The distributed backend's HTTP call failed.
    #[error("queue transport error: {0}")]
    Transport(String),
    /// The queue is at capacity (in-process channel full).
    #[error("queue is at capacity")]
    AtCapacity,
}

/// Contract both queue backends implement.
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues a new `run_analysis` job and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AtCapacity`] if the in-process channel is full,
    /// or [`QueueError::Transport`] if the distributed backend is unreachable.
    async fn enqueue(&self, payload: RunAnalysisPayload) -> Result<Uuid, QueueError>;

    /// Blocks up to `timeout` for the next available job.
    ///
    /// Returns `Ok(None)` on timeout with nothing available, never an error
    /// for that case.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Transport`] if the distributed backend is
    /// unreachable.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<DequeuedJob>, QueueError>;

    /// Acknowledges successful (or terminally failed) processing.
    ///
    /// Idempotent: acking an already-acked job is a no-op, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] or [`QueueError::Transport`].
    async fn ack(&self, job_id: Uuid) -> Result<(), QueueError>;

    /// Reports a transient processing failure.
    ///
    /// Increments the attempt counter; once it reaches [`MAX_ATTEMPTS`] the
    /// job is marked `failed` instead of being redelivered.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] or [`QueueError::Transport`].
    async fn nack(&self, job_id: Uuid, error: String) -> Result<(), QueueError>;

    /// Looks up a job's current durable state.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] or [`QueueError::Transport`].
    async fn status(&self, job_id: Uuid) -> Result<JobStatusSnapshot, QueueError>;
}

/// Builds the configured queue backend.
///
/// Distributed when `config.queue_backend` names a URL, in-process
/// otherwise.
#[must_use]
pub fn build(config: &AppConfig) -> Box<dyn JobQueue> {
    match &config.queue_backend {
        QueueBackend::InProcess => Box::new(InProcessQueue::new()),
        QueueBackend::Distributed { url } => {
            Box::new(DistributedQueue::new(url.clone(), config.queue_visibility_timeout))
        }
    }
}
