//! Postgres-backed queue backend.
//!
//! Jobs live in the `purchase_jobs` table. Claiming uses
//! `FOR UPDATE SKIP LOCKED` so any number of worker processes can poll the
//! same table without double-delivery; a crashed worker's transaction
//! releases its row lock and the job is re-claimed, which is where the
//! at-least-once guarantee comes from. Retries are `scheduled_at` pushes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::EngineError;

use super::{JobError, JobHandler, JobOptions, JobQueue, JobRecord, JobState, QueueStats, RetryPolicy};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct PostgresQueue {
    pool: PgPool,
    policy: RetryPolicy,
    closed: Arc<AtomicBool>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl PostgresQueue {
    pub fn new(pool: PgPool, policy: RetryPolicy) -> Self {
        Self {
            pool,
            policy,
            closed: Arc::new(AtomicBool::new(false)),
            workers: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Claim the next runnable job of `job_type`, atomically bumping its
    /// attempt counter and marking it active.
    async fn claim(pool: &PgPool, job_type: &str) -> Result<Option<JobRecord>, sqlx::Error> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"UPDATE purchase_jobs
               SET status = 'active', attempts = attempts + 1, updated_at = NOW()
               WHERE job_id = (
                   SELECT job_id FROM purchase_jobs
                   WHERE job_type = $1 AND status = 'queued' AND scheduled_at <= NOW()
                   ORDER BY priority DESC, created_at
                   FOR UPDATE SKIP LOCKED
                   LIMIT 1
               )
               RETURNING job_id, job_type, payload, priority, status, attempts,
                         max_attempts, created_at, last_error, result"#,
        )
        .bind(job_type)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn mark_completed(
        pool: &PgPool,
        job_id: Uuid,
        result: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE purchase_jobs
               SET status = 'completed', result = $2, updated_at = NOW()
               WHERE job_id = $1"#,
        )
        .bind(job_id)
        .bind(result)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(pool: &PgPool, job_id: Uuid, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE purchase_jobs
               SET status = 'failed', last_error = $2, updated_at = NOW()
               WHERE job_id = $1"#,
        )
        .bind(job_id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn reschedule(
        pool: &PgPool,
        job_id: Uuid,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE purchase_jobs
               SET status = 'queued', scheduled_at = $2, last_error = $3, updated_at = NOW()
               WHERE job_id = $1"#,
        )
        .bind(job_id)
        .bind(run_at)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn run_one(pool: &PgPool, policy: &RetryPolicy, record: JobRecord, handler: &JobHandler) {
        let job_id = record.job_id;
        let attempts = record.attempts;

        let outcome = handler(record).await;
        let settle = match outcome {
            Ok(result) => Self::mark_completed(pool, job_id, &result).await,
            Err(JobError::Fail(msg)) => {
                tracing::warn!(%job_id, error = %msg, "job failed terminally");
                Self::mark_failed(pool, job_id, &msg).await
            }
            Err(JobError::Retry(msg)) => {
                if policy.exhausted(attempts) {
                    tracing::warn!(%job_id, attempts, error = %msg, "retry budget exhausted");
                    Self::mark_failed(pool, job_id, &msg).await
                } else {
                    let delay = policy.backoff(attempts);
                    let run_at = Utc::now()
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(1));
                    tracing::debug!(%job_id, attempts, ?delay, "scheduling retry");
                    Self::reschedule(pool, job_id, run_at, &msg).await
                }
            }
        };

        if let Err(e) = settle {
            // The row stays 'active'; the reaper below re-queues it, so the
            // job is delivered again rather than lost.
            tracing::error!(%job_id, error = %e, "failed to settle job state");
        }
    }
}

/// Re-queue jobs stuck in 'active' longer than the stale threshold:
/// workers that died between claim and settle. This is what makes delivery
/// at-least-once across process crashes.
async fn requeue_stale(pool: &PgPool, older_than: Duration) -> Result<u64, sqlx::Error> {
    let cutoff = Utc::now()
        - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::seconds(60));
    let result = sqlx::query(
        r#"UPDATE purchase_jobs
           SET status = 'queued', updated_at = NOW()
           WHERE status = 'active' AND updated_at < $1"#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[async_trait]
impl JobQueue for PostgresQueue {
    async fn add_job(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        opts: JobOptions,
    ) -> Result<Uuid, EngineError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::Queue("queue is closed".into()));
        }

        let job_id = opts.job_id.unwrap_or_else(Uuid::new_v4);
        let scheduled_at = match opts.delay {
            Some(delay) => {
                Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
            }
            None => Utc::now(),
        };

        // Stable id: conflicting insert is a no-op and the original job wins.
        sqlx::query(
            r#"INSERT INTO purchase_jobs
                   (job_id, job_type, payload, priority, status, max_attempts, scheduled_at)
               VALUES ($1, $2, $3, $4, 'queued', $5, $6)
               ON CONFLICT (job_id) DO NOTHING"#,
        )
        .bind(job_id)
        .bind(job_type)
        .bind(&payload)
        .bind(opts.priority)
        .bind(self.policy.max_attempts as i32)
        .bind(scheduled_at)
        .execute(&self.pool)
        .await
        .map_err(EngineError::Database)?;

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
            let pool = self.pool.clone();
            let policy = self.policy.clone();
            let closed = Arc::clone(&self.closed);
            let handler = Arc::clone(&handler);
            let job_type = job_type.to_string();
            workers.push(tokio::spawn(async move {
                loop {
                    if closed.load(Ordering::Acquire) {
                        break;
                    }
                    match Self::claim(&pool, &job_type).await {
                        Ok(Some(record)) => {
                            Self::run_one(&pool, &policy, record, &handler).await;
                        }
                        Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
                        Err(e) => {
                            tracing::error!(error = %e, "claim query failed");
                            tokio::time::sleep(POLL_INTERVAL * 5).await;
                        }
                    }
                }
            }));
        }

        // One reaper alongside the pool: returns dead workers' claims to
        // the queue.
        let pool = self.pool.clone();
        let closed = Arc::clone(&self.closed);
        workers.push(tokio::spawn(async move {
            const STALE_AFTER: Duration = Duration::from_secs(60);
            const SWEEP_EVERY_TICKS: u32 = 30;
            let mut ticks = 0u32;
            while !closed.load(Ordering::Acquire) {
                tokio::time::sleep(Duration::from_secs(1)).await;
                ticks += 1;
                if ticks < SWEEP_EVERY_TICKS {
                    continue;
                }
                ticks = 0;
                match requeue_stale(&pool, STALE_AFTER).await {
                    Ok(0) => {}
                    Ok(n) => tracing::warn!(requeued = n, "re-queued stale active jobs"),
                    Err(e) => tracing::error!(error = %e, "stale-job sweep failed"),
                }
            }
        }));
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, EngineError> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"SELECT job_id, job_type, payload, priority, status, attempts,
                      max_attempts, created_at, last_error, result
               FROM purchase_jobs WHERE job_id = $1"#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(EngineError::Database)?;

        Ok(row.map(|r| r.into()))
    }

    async fn get_stats(&self) -> Result<QueueStats, EngineError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"SELECT status, COUNT(*) FROM purchase_jobs GROUP BY status"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(EngineError::Database)?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let count = count as u64;
            match JobState::from_db(&status) {
                JobState::Waiting => stats.waiting += count,
                JobState::Active => stats.active += count,
                JobState::Completed => stats.completed += count,
                JobState::Failed => stats.failed += count,
            }
        }
        Ok(stats)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    job_id: Uuid,
    job_type: String,
    payload: serde_json::Value,
    priority: i32,
    status: String,
    attempts: i32,
    max_attempts: i32,
    created_at: DateTime<Utc>,
    last_error: Option<String>,
    result: Option<serde_json::Value>,
}

impl From<JobRow> for JobRecord {
    fn from(row: JobRow) -> Self {
        JobRecord {
            job_id: row.job_id,
            job_type: row.job_type,
            payload: row.payload,
            priority: row.priority,
            state: JobState::from_db(&row.status),
            attempts: row.attempts.max(0) as u32,
            max_attempts: row.max_attempts.max(0) as u32,
            enqueued_at: row.created_at,
            last_error: row.last_error,
            result: row.result,
        }
    }
}
