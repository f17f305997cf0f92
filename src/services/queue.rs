use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::models::{RenderOutcome, ThumbnailJob};

/// Delivery policy applied to every enqueued job.
#[derive(Debug, Clone)]
pub struct QueuePolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    /// Finished (completed or failed) records kept for inspection.
    pub retention: usize,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(10),
            retention: 1000,
        }
    }
}

impl QueuePolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_base: Duration::from_secs(config.backoff_base_secs),
            retention: config.job_retention,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Active,
    Completed,
    Failed,
}

/// Bookkeeping for one job identity. Failed records keep their payload and
/// last error so exhausted jobs can be inspected manually.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub job: ThumbnailJob,
    pub state: JobState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub result: Option<RenderOutcome>,
}

/// Consumer side of the queue contract.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &ThumbnailJob) -> Result<RenderOutcome, PipelineError>;
}

/// In-process job queue with at-most-one-in-flight dedup per job id,
/// exponential-backoff redelivery and retention-capped history.
///
/// The job id is the concurrency boundary: a second enqueue for an id whose
/// job is still active is a no-op for the caller. A finished id may be
/// resubmitted and runs again with a fresh attempt budget.
pub struct JobQueue {
    policy: QueuePolicy,
    records: DashMap<String, JobRecord>,
    finished: Mutex<VecDeque<String>>,
    tx: mpsc::UnboundedSender<String>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl JobQueue {
    pub fn new(policy: QueuePolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            policy,
            records: DashMap::new(),
            finished: Mutex::new(VecDeque::new()),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Register a job under `job_id` and hand it to the consumer. Returns
    /// the id either way; duplicates of an active id are dropped.
    pub fn enqueue(&self, job_id: &str, job: ThumbnailJob) -> String {
        use dashmap::mapref::entry::Entry;

        let resubmitted = match self.records.entry(job_id.to_string()) {
            Entry::Occupied(mut existing) => {
                if existing.get().state == JobState::Active {
                    tracing::info!("job {} already in flight, enqueue is a no-op", job_id);
                    return job_id.to_string();
                }
                // Resubmission of a finished identity: fresh budget.
                let record = existing.get_mut();
                record.job = job;
                record.state = JobState::Active;
                record.attempts = 0;
                record.last_error = None;
                record.result = None;
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(JobRecord {
                    id: job_id.to_string(),
                    job,
                    state: JobState::Active,
                    attempts: 0,
                    last_error: None,
                    result: None,
                });
                false
            }
        };
        if resubmitted {
            self.finished.lock().unwrap().retain(|id| id != job_id);
        }

        // Receiver only goes away at shutdown; a dropped send is harmless then.
        let _ = self.tx.send(job_id.to_string());
        job_id.to_string()
    }

    /// Inspect a job's record.
    pub fn record(&self, job_id: &str) -> Option<JobRecord> {
        self.records.get(job_id).map(|r| r.clone())
    }

    /// Consumer loop: takes delivery of one job at a time and runs it to
    /// completion before the next. Call once; exits on shutdown signal.
    pub async fn run(
        self: Arc<Self>,
        handler: Arc<dyn JobHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .expect("queue consumer already running");

        tracing::info!("job queue consumer started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("job queue consumer shutting down");
                    break;
                }
                next = rx.recv() => {
                    let Some(job_id) = next else { break };
                    self.process(&job_id, handler.as_ref()).await;
                }
            }
        }
        // Hand the channel back so a restarted consumer picks up pending work.
        *self.rx.lock().unwrap() = Some(rx);
    }

    async fn process(&self, job_id: &str, handler: &dyn JobHandler) {
        let Some((job, attempt)) = self.records.get_mut(job_id).and_then(|mut r| {
            // Stale deliveries for settled jobs are dropped.
            if r.state != JobState::Active {
                return None;
            }
            r.attempts += 1;
            Some((r.job.clone(), r.attempts))
        }) else {
            tracing::debug!("skipping delivery for unknown or settled job {}", job_id);
            return;
        };

        tracing::debug!("job {} attempt {} starting", job_id, attempt);
        match handler.handle(&job).await {
            Ok(outcome) => {
                if let Some(mut record) = self.records.get_mut(job_id) {
                    record.state = JobState::Completed;
                    record.result = Some(outcome.clone());
                }
                self.finish(job_id);
                tracing::info!("job {} completed: {}", job_id, outcome.thumb_key);
            }
            Err(e) => {
                let exhausted = attempt >= self.policy.max_attempts;
                if e.is_permanent() || exhausted {
                    if let Some(mut record) = self.records.get_mut(job_id) {
                        record.state = JobState::Failed;
                        record.last_error = Some(format!("{}: {}", e.code(), e));
                    }
                    self.finish(job_id);
                    tracing::error!(
                        "job {} failed terminally after {} attempt(s): {}",
                        job_id,
                        attempt,
                        e
                    );
                } else {
                    let delay = self.policy.backoff_base * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        "job {} attempt {} failed, retrying in {:?}: {}",
                        job_id,
                        attempt,
                        delay,
                        e
                    );
                    let tx = self.tx.clone();
                    let id = job_id.to_string();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(id);
                    });
                }
            }
        }
    }

    /// Move a record into the finished ring, pruning the oldest entries
    /// beyond the retention cap.
    fn finish(&self, job_id: &str) {
        let mut evicted = Vec::new();
        {
            let mut finished = self.finished.lock().unwrap();
            finished.push_back(job_id.to_string());
            while finished.len() > self.policy.retention {
                if let Some(old) = finished.pop_front() {
                    evicted.push(old);
                }
            }
        }
        for old in evicted {
            // A resubmitted id is active again; leave its record alone.
            let still_finished = self
                .records
                .get(&old)
                .map(|r| r.state != JobState::Active)
                .unwrap_or(false);
            if still_finished {
                self.records.remove(&old);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn job(source: &str) -> ThumbnailJob {
        ThumbnailJob {
            source_key: source.to_string(),
            thumb_key: format!("assets/thumbnail/{source}.jpg"),
            width: 200,
            height: 200,
            version: "1.0.0".to_string(),
            user_data: json!({}),
        }
    }

    fn outcome(job: &ThumbnailJob) -> RenderOutcome {
        RenderOutcome {
            status: "ok".to_string(),
            source_key: job.source_key.clone(),
            thumb_key: job.thumb_key.clone(),
            width: job.width,
            height: job.height,
            byte_count: 3,
        }
    }

    struct CountingHandler {
        calls: AtomicU32,
        fail_first: u32,
        permanent: bool,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, job: &ThumbnailJob) -> Result<RenderOutcome, PipelineError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                if self.permanent {
                    Err(PipelineError::InvalidDocument("bad".to_string()))
                } else {
                    Err(PipelineError::RenderFailed("flaky".to_string()))
                }
            } else {
                Ok(outcome(job))
            }
        }
    }

    fn fast_policy() -> QueuePolicy {
        QueuePolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(10),
            retention: 1000,
        }
    }

    async fn run_until_finished(queue: &Arc<JobQueue>, handler: Arc<dyn JobHandler>, id: &str) {
        let (tx, rx) = watch::channel(false);
        let runner = tokio::spawn(queue.clone().run(handler, rx));
        for _ in 0..200 {
            if queue
                .record(id)
                .map(|r| r.state != JobState::Active)
                .unwrap_or(false)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let _ = tx.send(true);
        let _ = runner.await;
    }

    #[tokio::test]
    async fn test_retryable_failure_is_redelivered() {
        let queue = Arc::new(JobQueue::new(fast_policy()));
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
            fail_first: 2,
            permanent: false,
        });
        let id = queue.enqueue("thumb@a@t", job("final/a.gltf"));
        run_until_finished(&queue, handler.clone(), &id).await;

        let record = queue.record(&id).unwrap();
        assert_eq!(record.state, JobState::Completed);
        assert_eq!(record.attempts, 3);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_skips_retries() {
        let queue = Arc::new(JobQueue::new(fast_policy()));
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
            fail_first: 10,
            permanent: true,
        });
        let id = queue.enqueue("thumb@b@t", job("final/b.gltf"));
        run_until_finished(&queue, handler.clone(), &id).await;

        let record = queue.record(&id).unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.attempts, 1);
        assert!(record.last_error.unwrap().starts_with("INVALID_DOCUMENT"));
    }

    #[tokio::test]
    async fn test_retry_ceiling_exhausts() {
        let queue = Arc::new(JobQueue::new(fast_policy()));
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
            fail_first: 10,
            permanent: false,
        });
        let id = queue.enqueue("thumb@c@t", job("final/c.gltf"));
        run_until_finished(&queue, handler.clone(), &id).await;

        let record = queue.record(&id).unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.attempts, 3);
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_is_a_noop() {
        let queue = Arc::new(JobQueue::new(fast_policy()));
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
            fail_first: 0,
            permanent: false,
        });

        // Both submitted before the consumer starts: second must dedup.
        let id = queue.enqueue("thumb@d@t", job("final/d.gltf"));
        let id2 = queue.enqueue("thumb@d@t", job("final/d.gltf"));
        assert_eq!(id, id2);

        run_until_finished(&queue, handler.clone(), &id).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.record(&id).unwrap().state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_finished_identity_can_resubmit() {
        let queue = Arc::new(JobQueue::new(fast_policy()));
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
            fail_first: 0,
            permanent: false,
        });
        let id = queue.enqueue("thumb@e@t", job("final/e.gltf"));
        run_until_finished(&queue, handler.clone(), &id).await;
        assert_eq!(queue.record(&id).unwrap().state, JobState::Completed);

        let id = queue.enqueue("thumb@e@t", job("final/e.gltf"));
        run_until_finished(&queue, handler.clone(), &id).await;
        let record = queue.record(&id).unwrap();
        assert_eq!(record.state, JobState::Completed);
        assert_eq!(record.attempts, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }
}
