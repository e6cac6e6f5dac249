use crate::config::QueueConfig;
use crate::domain::job::{FailureReason, Job, JobOutcome, JobStatus};
use crate::domain::payment::{PaymentRequest, TransferReceipt};
use crate::error::{PaymentError, Result};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, watch};
use tokio::time::{Instant, sleep};
use tracing::debug;
use uuid::Uuid;

/// Handle returned to the caller that enqueued a job.
pub struct EnqueuedJob {
    pub id: Uuid,
    /// Receives the terminal outcome once the job completes or fails.
    pub outcome: watch::Receiver<Option<JobOutcome>>,
}

/// A job held exclusively by one worker for the duration of an attempt.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub payload: PaymentRequest,
    /// 1-based attempt number of this execution.
    pub attempt: u32,
}

struct JobEntry {
    job: Job,
    outcome_tx: watch::Sender<Option<JobOutcome>>,
}

#[derive(Default)]
struct QueueInner {
    jobs: HashMap<Uuid, JobEntry>,
    ready: VecDeque<Uuid>,
    delayed: BinaryHeap<Reverse<(Instant, Uuid)>>,
}

/// Ordered in-process queue of pending transfer jobs.
///
/// Jobs move `queued → active → {completed | retry_scheduled → queued |
/// failed}`. Claiming runs under the queue lock, so each job is held by
/// exactly one worker at a time. Completed jobs leave the table when
/// `remove_on_complete` is set; failed jobs are retained for inspection.
///
/// Terminal outcomes are broadcast on a per-job watch channel. The queue
/// itself never broadcasts — `complete` and `fail` are called by the worker
/// only after the outcome has been audited.
pub struct JobQueue {
    name: String,
    config: QueueConfig,
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl JobQueue {
    pub fn new(name: impl Into<String>, config: QueueConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Creates a `queued` job for `payload` and wakes one idle worker.
    pub async fn enqueue(&self, payload: PaymentRequest) -> EnqueuedJob {
        let job = Job::new(payload);
        let id = job.id;
        let (outcome_tx, outcome) = watch::channel(None);

        let mut inner = self.inner.lock().await;
        inner.jobs.insert(id, JobEntry { job, outcome_tx });
        inner.ready.push_back(id);
        drop(inner);

        debug!(queue = %self.name, job = %id, "job enqueued");
        self.notify.notify_one();
        EnqueuedJob { id, outcome }
    }

    /// Claims the next eligible job, waiting until one becomes due.
    pub async fn claim(&self) -> ClaimedJob {
        loop {
            let wait_for = {
                let mut inner = self.inner.lock().await;
                Self::promote_due(&mut inner);

                if let Some(id) = inner.ready.pop_front() {
                    if let Some(entry) = inner.jobs.get_mut(&id) {
                        entry.job.status = JobStatus::Active;
                        entry.job.attempts += 1;
                        entry.job.scheduled_at = None;
                        return ClaimedJob {
                            id,
                            payload: entry.job.payload.clone(),
                            attempt: entry.job.attempts,
                        };
                    }
                    continue;
                }

                inner
                    .delayed
                    .peek()
                    .map(|&Reverse((due, _))| due.saturating_duration_since(Instant::now()))
            };

            match wait_for {
                Some(delay) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = sleep(delay) => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    /// Finalizes a successful job. The worker must have audited first.
    pub async fn complete(&self, id: Uuid, receipt: TransferReceipt) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| PaymentError::internal(format!("unknown job {id}")))?;

        entry.job.status = JobStatus::Completed;
        let _ = entry.outcome_tx.send(Some(JobOutcome::Settled(receipt)));

        if self.config.remove_on_complete {
            inner.jobs.remove(&id);
        }
        debug!(queue = %self.name, job = %id, "job completed");
        Ok(())
    }

    /// Finalizes a failed job; the row is retained for inspection.
    pub async fn fail(&self, id: Uuid, reason: FailureReason) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| PaymentError::internal(format!("unknown job {id}")))?;

        entry.job.status = JobStatus::Failed;
        entry.job.last_error = Some(reason.message.clone());
        let _ = entry.outcome_tx.send(Some(JobOutcome::Failed(reason)));
        debug!(queue = %self.name, job = %id, "job failed");
        Ok(())
    }

    /// Schedules the next attempt per the exponential backoff policy and
    /// returns the delay. The caller has already checked the attempt budget.
    pub async fn retry(&self, id: Uuid, error: &PaymentError) -> Result<Duration> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| PaymentError::internal(format!("unknown job {id}")))?;

        let delay = self.config.backoff_for_attempt(entry.job.attempts + 1);
        let due = Instant::now() + delay;
        entry.job.status = JobStatus::RetryScheduled;
        entry.job.scheduled_at = Some(due);
        entry.job.last_error = Some(error.to_string());
        inner.delayed.push(Reverse((due, id)));
        drop(inner);

        debug!(queue = %self.name, job = %id, ?delay, "retry scheduled");
        self.notify.notify_one();
        Ok(delay)
    }

    /// Snapshot of one job row, if retained.
    pub async fn job(&self, id: Uuid) -> Option<Job> {
        let inner = self.inner.lock().await;
        inner.jobs.get(&id).map(|entry| entry.job.clone())
    }

    /// Jobs currently queued or awaiting retry.
    pub async fn depth(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.ready.len() + inner.delayed.len()
    }

    fn promote_due(inner: &mut QueueInner) {
        let now = Instant::now();
        while let Some(&Reverse((due, id))) = inner.delayed.peek() {
            if due > now {
                break;
            }
            inner.delayed.pop();
            if let Some(entry) = inner.jobs.get_mut(&id) {
                entry.job.status = JobStatus::Queued;
                inner.ready.push_back(id);
            }
        }
    }
}
