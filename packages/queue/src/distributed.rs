//! HTTP client for an external queue service with visibility-timeout
//! semantics: a dequeued job becomes invisible to other workers for
//! `processing_timeout`; an un-acked job reappears once that elapses.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DequeuedJob, JobQueue, JobStatusSnapshot, QueueError, RunAnalysisPayload, RUN_ANALYSIS};

/// Talks to an external, FIFO-per-queue job service.
pub struct DistributedQueue {
    base_url: String,
    visibility_timeout: Duration,
    client: reqwest::Client,
}

impl DistributedQueue {
    /// Builds a client pointed at `base_url`.
    #[must_use]
    pub fn new(base_url: String, visibility_timeout: Duration) -> Self {
        Self {
            base_url,
            visibility_timeout,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct EnqueueRequest<'a> {
    job_type: &'a str,
    payload: RunAnalysisPayload,
}

#[derive(Deserialize)]
struct EnqueueResponse {
    job_id: Uuid,
}

#[derive(Serialize)]
struct DequeueRequest {
    timeout_ms: u64,
    visibility_timeout_ms: u64,
}

#[derive(Deserialize)]
struct DequeueResponse {
    job: Option<DequeuedJobWire>,
}

#[derive(Deserialize)]
struct DequeuedJobWire {
    id: Uuid,
    job_type: String,
    payload: RunAnalysisPayload,
    attempts: u32,
}

#[derive(Serialize)]
struct NackRequest<'a> {
    error: &'a str,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: caseforge_domain::JobStatus,
    attempts: u32,
    last_error: Option<String>,
}

impl From<reqwest::Error> for QueueError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[async_trait::async_trait]
impl JobQueue for DistributedQueue {
    async fn enqueue(&self, payload: RunAnalysisPayload) -> Result<Uuid, QueueError> {
        let resp: EnqueueResponse = self
            .client
            .post(format!("{}/jobs", self.base_url))
            .json(&EnqueueRequest {
                job_type: RUN_ANALYSIS,
                payload,
            })
            .send()
            .await?
            .error_for_status()
            .map_err(|e| QueueError::Transport(e.to_string()))?
            .json()
            .await?;
        Ok(resp.job_id)
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<DequeuedJob>, QueueError> {
        let resp: DequeueResponse = self
            .client
            .post(format!("{}/jobs/dequeue", self.base_url))
            .json(&DequeueRequest {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                visibility_timeout_ms: u64::try_from(self.visibility_timeout.as_millis())
                    .unwrap_or(u64::MAX),
            })
            .timeout(timeout + Duration::from_secs(5))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| QueueError::Transport(e.to_string()))?
            .json()
            .await?;

        Ok(resp.job.map(|j| DequeuedJob {
            id: j.id,
            job_type: j.job_type,
            payload: j.payload,
            attempts: j.attempts,
        }))
    }

    async fn ack(&self, job_id: Uuid) -> Result<(), QueueError> {
        self.client
            .post(format!("{}/jobs/{job_id}/ack", self.base_url))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn nack(&self, job_id: Uuid, error: String) -> Result<(), QueueError> {
        self.client
            .post(format!("{}/jobs/{job_id}/nack", self.base_url))
            .json(&NackRequest { error: &error })
            .send()
            .await?
            .error_for_status()
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn status(&self, job_id: Uuid) -> Result<JobStatusSnapshot, QueueError> {
        let resp = self
            .client
            .get(format!("{}/jobs/{job_id}", self.base_url))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(QueueError::NotFound(job_id));
        }
        let resp: StatusResponse = resp
            .error_for_status()
            .map_err(|e| QueueError::Transport(e.to_string()))?
            .json()
            .await?;
        Ok(JobStatusSnapshot {
            status: resp.status,
            attempts: resp.attempts,
            last_error: resp.last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_with_given_base_url() {
        let queue = DistributedQueue::new("https://queue.internal".to_string(), Duration::from_secs(600));
        assert_eq!(queue.base_url, "https://queue.internal");
        assert_eq!(queue.visibility_timeout, Duration::from_secs(600));
    }
}
