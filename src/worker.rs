//! Purchase worker: the critical section of the pipeline.
//!
//! For each job the handler produces exactly one terminal outcome. The
//! stock decrement and the order insert run inside one short transaction
//! holding a per-product advisory lock, so concurrent critical sections on
//! the same product are serialized across every worker process. The
//! transaction doubles as the compensation mechanism: a unique-violation on
//! the insert, a timeout, or a crash all roll back the decrement with the
//! lock release.
//!
//! The conditional UPDATE is the authoritative oversell guard even without
//! the lock; the lock keeps wasted decrement/rollback cycles low. The
//! (user, product) unique constraint is the final safety net for duplicate
//! purchases, and the order id being the job id makes retried inserts
//! idempotent.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;

use crate::cache::{SaleStatusCache, StatusCache};
use crate::error::{EngineError, FailureReason};
use crate::models::{JobOutcome, JobSnapshot, JobStatus, PurchasePayload};
use crate::queue::{JobError, JobHandler, JobQueue, JobRecord};
use crate::store::{FlashSaleRepository, OrderInsert, OrderRepository, StockRepository};

pub struct PurchaseWorker {
    pool: PgPool,
    status_cache: Arc<StatusCache>,
    sale_cache: Arc<SaleStatusCache>,
    job_timeout: Duration,
}

impl PurchaseWorker {
    pub fn new(
        pool: PgPool,
        status_cache: Arc<StatusCache>,
        sale_cache: Arc<SaleStatusCache>,
        job_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            status_cache,
            sale_cache,
            job_timeout,
        }
    }

    /// Wrap this worker as a queue handler.
    pub fn handler(self: Arc<Self>) -> JobHandler {
        Arc::new(move |record| {
            let worker = Arc::clone(&self);
            Box::pin(async move { worker.handle(record).await })
        })
    }

    async fn handle(&self, record: JobRecord) -> Result<serde_json::Value, JobError> {
        let payload: PurchasePayload = serde_json::from_value(record.payload)
            .map_err(|e| JobError::Fail(format!("malformed purchase payload: {e}")))?;

        self.mark(&payload, JobStatus::Processing, None);

        let timeout_secs = self.job_timeout.as_secs();
        let outcome = match tokio::time::timeout(self.job_timeout, self.execute(&payload)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) if e.is_transient() => {
                // No terminal status write: the queue retries and the cache
                // keeps showing `processing`.
                tracing::warn!(job_id = %payload.job_id, error = %e, "transient failure, retrying");
                return Err(JobError::Retry(e.to_string()));
            }
            Ok(Err(e)) => {
                tracing::error!(job_id = %payload.job_id, error = %e, "purchase failed");
                JobOutcome::rejected(FailureReason::Internal)
            }
            Err(_) => {
                // Dropping the in-flight transaction rolled back any
                // decrement and released the advisory lock.
                tracing::error!(job_id = %payload.job_id, timeout_secs, "purchase timed out");
                JobOutcome::rejected(FailureReason::Internal)
            }
        };

        let status = if outcome.success {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        self.mark(&payload, status, Some(outcome.clone()));

        serde_json::to_value(&outcome).map_err(|e| JobError::Fail(e.to_string()))
    }

    /// The critical section. Business outcomes come back as `Ok`; only
    /// infrastructure failures are errors.
    async fn execute(&self, payload: &PurchasePayload) -> Result<JobOutcome, EngineError> {
        // Re-check the window by wall-clock; admission may be seconds stale.
        let sale = FlashSaleRepository::get(&self.pool, payload.sale_id).await?;
        let Some(sale) = sale else {
            return Ok(JobOutcome::rejected(FailureReason::SaleNotOpen));
        };
        if !sale.is_active_at(Utc::now()) {
            return Ok(JobOutcome::rejected(FailureReason::SaleNotOpen));
        }

        let mut tx = self.pool.begin().await?;
        StockRepository::lock_product(&mut *tx, payload.product_id).await?;

        let available = StockRepository::available(&mut *tx, payload.product_id)
            .await?
            .ok_or_else(|| {
                EngineError::Invariant(format!("no stock row for product {}", payload.product_id))
            })?;
        if available <= 0 {
            tx.rollback().await?;
            return Ok(JobOutcome::rejected(FailureReason::OutOfStock));
        }

        if !StockRepository::try_decrement(&mut *tx, payload.product_id).await? {
            tx.rollback().await?;
            return Ok(JobOutcome::rejected(FailureReason::OutOfStock));
        }

        match OrderRepository::insert_confirmed(
            &mut *tx,
            payload.job_id,
            payload.user_id,
            payload.product_id,
        )
        .await?
        {
            OrderInsert::Inserted => {
                let purchased_at = Utc::now();
                tx.commit().await?;
                self.sale_cache.invalidate(sale.sale_id).await;
                tracing::info!(
                    job_id = %payload.job_id,
                    user_id = %payload.user_id,
                    "purchase confirmed"
                );
                Ok(JobOutcome::confirmed(payload.job_id, purchased_at))
            }
            OrderInsert::DuplicateJob => {
                // An earlier attempt of this same job already landed its
                // order; undo this decrement and report the original success.
                tx.rollback().await?;
                let purchased_at = OrderRepository::get(&self.pool, payload.job_id)
                    .await?
                    .map(|o| o.created_at)
                    .unwrap_or_else(Utc::now);
                tracing::info!(job_id = %payload.job_id, "retried job, order already confirmed");
                Ok(JobOutcome::confirmed(payload.job_id, purchased_at))
            }
            OrderInsert::DuplicateUser => {
                // Rollback restores the decremented unit.
                tx.rollback().await?;
                tracing::info!(
                    job_id = %payload.job_id,
                    user_id = %payload.user_id,
                    "duplicate purchase refused by unique constraint"
                );
                Ok(JobOutcome::rejected(FailureReason::AlreadyPurchased))
            }
        }
    }

    /// Publish a transition under both the job and user keys. The worker
    /// owns every status write after admission's initial queued entry.
    fn mark(&self, payload: &PurchasePayload, status: JobStatus, outcome: Option<JobOutcome>) {
        self.status_cache.transition(JobSnapshot {
            job_id: payload.job_id,
            user_id: payload.user_id,
            status,
            outcome,
            updated_at: Utc::now(),
        });
    }
}

/// Periodic upkeep for the worker pool: queue counters into the log and a
/// status-cache sweep. Runs until the process exits.
pub fn spawn_maintenance(
    queue: Arc<dyn JobQueue>,
    status_cache: Arc<StatusCache>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            status_cache.sweep();
            match queue.get_stats().await {
                Ok(stats) => tracing::info!(
                    waiting = stats.waiting,
                    active = stats.active,
                    completed = stats.completed,
                    failed = stats.failed,
                    "queue stats"
                ),
                Err(e) => tracing::warn!(error = %e, "queue stats unavailable"),
            }
        }
    })
}
