//! Durable job queue interface.
//!
//! The rest of the engine depends only on [`JobQueue`]; the backend is
//! chosen once at startup through [`build_queue`] and never swapped.
//! Guarantees required of every backend: at-least-once delivery, bounded
//! retries with exponential backoff, a stable job id that survives retries,
//! and parallel workers up to the declared concurrency. Priority is a hint;
//! ordering across different job ids is not guaranteed.

pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rand::Rng;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::EngineError;

/// Job type handled by the purchase worker pool.
pub const PURCHASE_JOB_TYPE: &str = "purchase";

/// Named queue providers. Postgres is the default: delivery survives
/// process restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBackend {
    Memory,
    #[default]
    Postgres,
}

impl QueueBackend {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "memory" => Some(QueueBackend::Memory),
            "postgres" => Some(QueueBackend::Postgres),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueBackend::Memory => "memory",
            QueueBackend::Postgres => "postgres",
        }
    }
}

/// Options accepted by [`JobQueue::add_job`].
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Caller-supplied stable id. Re-adding an existing id is a no-op that
    /// returns the original id.
    pub job_id: Option<Uuid>,
    /// Scheduling hint; higher runs earlier when the backend can honor it.
    pub priority: i32,
    /// Do not run before this delay has elapsed.
    pub delay: Option<Duration>,
}

/// Queue-level lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_db(&self) -> &'static str {
        match self {
            JobState::Waiting => "queued",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn from_db(s: &str) -> JobState {
        match s {
            "active" => JobState::Active,
            "completed" => JobState::Completed,
            "failed" => JobState::Failed,
            _ => JobState::Waiting,
        }
    }
}

/// A job as the queue sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub state: JobState,
    pub attempts: u32,
    pub max_attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

/// Aggregate queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    /// Jobs ahead of a new admission: everything not yet terminal.
    pub fn backlog(&self) -> u64 {
        self.waiting + self.active
    }
}

/// Handler failure modes. `Retry` re-queues with backoff until the attempt
/// ceiling; `Fail` is terminal immediately. Business outcomes are not
/// errors; handlers encode them in the success result.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("retriable: {0}")]
    Retry(String),
    #[error("fatal: {0}")]
    Fail(String),
}

/// Async job handler. Returns the job's result document on success.
pub type JobHandler = Arc<
    dyn Fn(JobRecord) -> BoxFuture<'static, Result<serde_json::Value, JobError>> + Send + Sync,
>;

/// The capability set every backend provides.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job. Returns the stable job id.
    async fn add_job(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        opts: JobOptions,
    ) -> Result<Uuid, EngineError>;

    /// Start `concurrency` workers pulling jobs of `job_type` through
    /// `handler`. Returns once the workers are running.
    async fn process(
        &self,
        job_type: &str,
        concurrency: usize,
        handler: JobHandler,
    ) -> Result<(), EngineError>;

    /// Look up one job by id.
    async fn get_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, EngineError>;

    /// Aggregate counters.
    async fn get_stats(&self) -> Result<QueueStats, EngineError>;

    /// Stop intake and wind down workers. In-flight jobs finish their
    /// current attempt.
    async fn close(&self);
}

/// Retry schedule: exponential, capped, with up to 25% additive jitter so
/// retries of jobs that failed together do not land together.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &QueueConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base: Duration::from_millis(cfg.backoff_base_ms),
            cap: Duration::from_millis(cfg.backoff_cap_ms),
        }
    }

    /// Backoff before retry number `attempt` (1-based count of attempts
    /// already made).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let doubled = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = doubled.min(self.cap);
        let jitter_ceiling = (capped.as_millis() as u64 / 4).max(1);
        let jitter = rand::thread_rng().gen_range(0..jitter_ceiling);
        capped + Duration::from_millis(jitter)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// Build the configured backend. The pool is only used by the postgres
/// provider.
pub fn build_queue(cfg: &QueueConfig, pool: PgPool) -> Arc<dyn JobQueue> {
    let policy = RetryPolicy::from_config(cfg);
    match cfg.backend {
        QueueBackend::Memory => Arc::new(memory::MemoryQueue::new(policy)),
        QueueBackend::Postgres => Arc::new(postgres::PostgresQueue::new(pool, policy)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base: Duration::from_millis(100),
            cap: Duration::from_millis(2_000),
        }
    }

    #[test]
    fn backoff_grows_exponentially_until_the_cap() {
        let p = policy();
        // Jitter adds at most 25%, so comparing floors is stable.
        assert!(p.backoff(1) >= Duration::from_millis(100));
        assert!(p.backoff(1) < Duration::from_millis(200));
        assert!(p.backoff(2) >= Duration::from_millis(200));
        assert!(p.backoff(3) >= Duration::from_millis(400));
        assert!(p.backoff(10) <= Duration::from_millis(2_500));
    }

    #[test]
    fn attempt_ceiling() {
        let p = policy();
        assert!(!p.exhausted(4));
        assert!(p.exhausted(5));
        assert!(p.exhausted(6));
    }

    #[test]
    fn backend_names_round_trip() {
        assert_eq!(QueueBackend::parse("memory"), Some(QueueBackend::Memory));
        assert_eq!(QueueBackend::parse("postgres"), Some(QueueBackend::Postgres));
        assert_eq!(QueueBackend::parse("sqs"), None);
        assert_eq!(QueueBackend::default().as_str(), "postgres");
    }

    #[test]
    fn job_state_db_round_trip() {
        for state in [
            JobState::Waiting,
            JobState::Active,
            JobState::Completed,
            JobState::Failed,
        ] {
            assert_eq!(JobState::from_db(state.as_db()), state);
        }
    }
}
