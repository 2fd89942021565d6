//! In-process queue backend.
//!
//! Keeps the full queue contract (stable ids, retry with backoff, stats)
//! without external infrastructure. Delivery does not survive a process
//! restart, so this backend is for development and tests; deployments use
//! the postgres provider.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::EngineError;

use super::{JobError, JobHandler, JobOptions, JobQueue, JobRecord, JobState, QueueStats, RetryPolicy};

struct Inner {
    /// Ready job ids per job type. Separate deques so a worker pool only
    /// sees its own type.
    ready: Mutex<HashMap<String, VecDeque<Uuid>>>,
    jobs: DashMap<Uuid, JobRecord>,
    notify: Notify,
    closed: AtomicBool,
    policy: RetryPolicy,
}

impl Inner {
    fn push_ready(&self, job_type: &str, job_id: Uuid, front: bool) {
        let mut ready = self.ready.lock().expect("ready lock poisoned");
        let deque = ready.entry(job_type.to_string()).or_default();
        if front {
            deque.push_front(job_id);
        } else {
            deque.push_back(job_id);
        }
        drop(ready);
        self.notify.notify_one();
    }

    fn pop_ready(&self, job_type: &str) -> Option<Uuid> {
        let mut ready = self.ready.lock().expect("ready lock poisoned");
        ready.get_mut(job_type).and_then(|deque| deque.pop_front())
    }
}

pub struct MemoryQueue {
    inner: Arc<Inner>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl MemoryQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                ready: Mutex::new(HashMap::new()),
                jobs: DashMap::new(),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
                policy,
            }),
            workers: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    async fn run_one(inner: &Arc<Inner>, job_id: Uuid, handler: &JobHandler) {
        let record = {
            let Some(mut entry) = inner.jobs.get_mut(&job_id) else {
                tracing::error!(%job_id, "ready queue referenced unknown job");
                return;
            };
            entry.state = JobState::Active;
            entry.attempts += 1;
            entry.clone()
        };

        let attempts = record.attempts;
        let job_type = record.job_type.clone();
        let outcome = handler(record).await;

        match outcome {
            Ok(result) => {
                if let Some(mut entry) = inner.jobs.get_mut(&job_id) {
                    entry.state = JobState::Completed;
                    entry.result = Some(result);
                }
            }
            Err(JobError::Fail(msg)) => {
                tracing::warn!(%job_id, error = %msg, "job failed terminally");
                if let Some(mut entry) = inner.jobs.get_mut(&job_id) {
                    entry.state = JobState::Failed;
                    entry.last_error = Some(msg);
                }
            }
            Err(JobError::Retry(msg)) => {
                if inner.policy.exhausted(attempts) {
                    tracing::warn!(%job_id, attempts, error = %msg, "retry budget exhausted");
                    if let Some(mut entry) = inner.jobs.get_mut(&job_id) {
                        entry.state = JobState::Failed;
                        entry.last_error = Some(msg);
                    }
                } else {
                    let delay = inner.policy.backoff(attempts);
                    tracing::debug!(%job_id, attempts, ?delay, "scheduling retry");
                    if let Some(mut entry) = inner.jobs.get_mut(&job_id) {
                        entry.state = JobState::Waiting;
                        entry.last_error = Some(msg);
                    }
                    let inner = Arc::clone(inner);
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        inner.push_ready(&job_type, job_id, false);
                    });
                }
            }
        }
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn add_job(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        opts: JobOptions,
    ) -> Result<Uuid, EngineError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(EngineError::Queue("queue is closed".into()));
        }

        let job_id = opts.job_id.unwrap_or_else(Uuid::new_v4);
        if self.inner.jobs.contains_key(&job_id) {
            // Stable id: re-adding is idempotent.
            return Ok(job_id);
        }

        let record = JobRecord {
            job_id,
            job_type: job_type.to_string(),
            payload,
            priority: opts.priority,
            state: JobState::Waiting,
            attempts: 0,
            max_attempts: self.inner.policy.max_attempts,
            enqueued_at: Utc::now(),
            last_error: None,
            result: None,
        };
        self.inner.jobs.insert(job_id, record);

        let front = opts.priority > 0;
        match opts.delay {
            Some(delay) if !delay.is_zero() => {
                let inner = Arc::clone(&self.inner);
                let job_type = job_type.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.push_ready(&job_type, job_id, front);
                });
            }
            _ => self.inner.push_ready(job_type, job_id, front),
        }

        Ok(job_id)
    }

    async fn process(
        &self,
        job_type: &str,
        concurrency: usize,
        handler: JobHandler,
    ) -> Result<(), EngineError> {
        let mut workers = self.workers.lock().await;
        for _ in 0..concurrency.max(1) {
            let inner = Arc::clone(&self.inner);
            let handler = Arc::clone(&handler);
            let job_type = job_type.to_string();
            workers.push(tokio::spawn(async move {
                loop {
                    match inner.pop_ready(&job_type) {
                        Some(job_id) => MemoryQueue::run_one(&inner, job_id, &handler).await,
                        None => {
                            if inner.closed.load(Ordering::Acquire) {
                                break;
                            }
                            tokio::select! {
                                _ = inner.notify.notified() => {}
                                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                            }
                        }
                    }
                }
            }));
        }
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, EngineError> {
        Ok(self.inner.jobs.get(&job_id).map(|entry| entry.value().clone()))
    }

    async fn get_stats(&self) -> Result<QueueStats, EngineError> {
        let mut stats = QueueStats::default();
        for entry in self.inner.jobs.iter() {
            match entry.state {
                JobState::Waiting => stats.waiting += 1,
                JobState::Active => stats.active += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
    }
}
