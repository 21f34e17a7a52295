//! Bounded in-process queue: a `tokio::sync::mpsc` channel plus an
//! in-memory status map. Restart loses in-flight jobs — an accepted
//! trade-off for single-node development.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use caseforge_domain::JobStatus;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use uuid::Uuid;

use crate::{DequeuedJob, JobQueue, JobStatusSnapshot, QueueError, RunAnalysisPayload, MAX_ATTEMPTS, RUN_ANALYSIS};

const CHANNEL_CAPACITY: usize = 1_024;

#[derive(Debug, Clone)]
struct JobRecord {
    payload: RunAnalysisPayload,
    status: JobStatus,
    attempts: u32,
    last_error: Option<String>,
}

/// Single-process job queue backed by a bounded channel.
pub struct InProcessQueue {
    sender: mpsc::Sender<Uuid>,
    receiver: AsyncMutex<mpsc::Receiver<Uuid>>,
    jobs: Mutex<HashMap<Uuid, JobRecord>>,
}

impl Default for InProcessQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessQueue {
    /// Builds an empty queue with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            receiver: AsyncMutex::new(receiver),
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl JobQueue for InProcessQueue {
    async fn enqueue(&self, payload: RunAnalysisPayload) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        {
            let mut jobs = self.jobs.lock().expect("jobs mutex poisoned");
            jobs.insert(
                id,
                JobRecord {
                    payload,
                    status: JobStatus::Queued,
                    attempts: 0,
                    last_error: None,
                },
            );
        }
        self.sender.try_send(id).map_err(|_| QueueError::AtCapacity)?;
        Ok(id)
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<DequeuedJob>, QueueError> {
        let mut receiver = self.receiver.lock().await;
        let Ok(Some(id)) = tokio::time::timeout(timeout, receiver.recv()).await else {
            return Ok(None);
        };

        let mut jobs = self.jobs.lock().expect("jobs mutex poisoned");
        let Some(record) = jobs.get_mut(&id) else {
            return Ok(None);
        };
        record.status = JobStatus::Running;
        record.attempts += 1;

        Ok(Some(DequeuedJob {
            id,
            job_type: RUN_ANALYSIS.to_string(),
            payload: record.payload.clone(),
            attempts: record.attempts,
        }))
    }

    async fn ack(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().expect("jobs mutex poisoned");
        let record = jobs.get_mut(&job_id).ok_or(QueueError::NotFound(job_id))?;
        record.status = JobStatus::Done;
        Ok(())
    }

    async fn nack(&self, job_id: Uuid, error: String) -> Result<(), QueueError> {
        let should_redeliver;
        {
            let mut jobs = self.jobs.lock().expect("jobs mutex poisoned");
            let record = jobs.get_mut(&job_id).ok_or(QueueError::NotFound(job_id))?;
            record.last_error = Some(error);
            should_redeliver = record.attempts < MAX_ATTEMPTS;
            record.status = if should_redeliver {
                JobStatus::Queued
            } else {
                JobStatus::Failed
            };
        }
        if should_redeliver {
            self.sender.try_send(job_id).map_err(|_| QueueError::AtCapacity)?;
        }
        Ok(())
    }

    async fn status(&self, job_id: Uuid) -> Result<JobStatusSnapshot, QueueError> {
        let jobs = self.jobs.lock().expect("jobs mutex poisoned");
        let record = jobs.get(&job_id).ok_or(QueueError::NotFound(job_id))?;
        Ok(JobStatusSnapshot {
            status: record.status,
            attempts: record.attempts,
            last_error: record.last_error.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> RunAnalysisPayload {
        RunAnalysisPayload {
            analysis_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_returns_the_same_job() {
        let queue = InProcessQueue::new();
        let id = queue.enqueue(payload()).await.unwrap();
        let job = queue.dequeue(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn dequeue_times_out_on_empty_queue() {
        let queue = InProcessQueue::new();
        let job = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        assert!(job.is_none());
    }

    #[tokio::test]
    async fn nack_redelivers_until_max_attempts_then_fails() {
        let queue = InProcessQueue::new();
        let id = queue.enqueue(payload()).await.unwrap();

        for _ in 0..MAX_ATTEMPTS {
            queue.dequeue(Duration::from_secs(1)).await.unwrap().unwrap();
            queue.nack(id, "boom".to_string()).await.unwrap();
        }

        let status = queue.status(id).await.unwrap();
        assert_eq!(status.status, JobStatus::Failed);
        assert_eq!(status.attempts, MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn ack_marks_job_done() {
        let queue = InProcessQueue::new();
        let id = queue.enqueue(payload()).await.unwrap();
        queue.dequeue(Duration::from_secs(1)).await.unwrap();
        queue.ack(id).await.unwrap();
        assert_eq!(queue.status(id).await.unwrap().status, JobStatus::Done);
    }

    #[tokio::test]
    async fn unknown_job_id_is_not_found() {
        let queue = InProcessQueue::new();
        let err = queue.ack(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }
}
