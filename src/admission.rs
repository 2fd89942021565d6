//! Admission: the front door of the purchase pipeline.
//!
//! Order of operations is load-bearing. The queued status is written to the
//! cache *before* the job is enqueued, so a concurrent second submission
//! from the same user observes the pending state; a crash between the two
//! steps leaves only a ghost queued entry that ages out with the TTL. The
//! reverse order would let a duplicate job race past the check.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::cache::StatusCache;
use crate::config::AdmissionConfig;
use crate::error::{EngineError, RejectReason};
use crate::models::{JobSnapshot, JobStatus, PurchasePayload, SaleStatus};
use crate::projection::SaleProjection;
use crate::queue::{JobOptions, JobQueue, PURCHASE_JOB_TYPE};

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("{0}")]
    Rejected(#[from] RejectReason),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// What a successful admission returns to the caller.
#[derive(Debug, Clone)]
pub struct AdmissionTicket {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub estimated_wait_secs: f64,
}

/// Fixed-window limiter: at most `max_per_window` admissions per user per
/// window. Enforced before the duplicate check so a hammering client cannot
/// keep the cache hot.
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    hits: DashMap<Uuid, (Instant, u32)>,
}

impl RateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            hits: DashMap::new(),
        }
    }

    /// Count one attempt; false when the user is over budget.
    pub fn allow(&self, user_id: Uuid) -> bool {
        let now = Instant::now();
        let mut entry = self.hits.entry(user_id).or_insert((now, 0));
        let (window_start, count) = *entry;
        if now.duration_since(window_start) >= self.window {
            *entry = (now, 1);
            return true;
        }
        if count >= self.max_per_window {
            return false;
        }
        *entry = (window_start, count + 1);
        true
    }
}

pub struct AdmissionService {
    queue: Arc<dyn JobQueue>,
    status_cache: Arc<StatusCache>,
    projection: Arc<SaleProjection>,
    limiter: RateLimiter,
    est_secs_per_job: f64,
}

impl AdmissionService {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        status_cache: Arc<StatusCache>,
        projection: Arc<SaleProjection>,
        cfg: &AdmissionConfig,
    ) -> Self {
        Self {
            queue,
            status_cache,
            projection,
            limiter: RateLimiter::new(cfg.rate_limit_per_min, Duration::from_secs(60)),
            est_secs_per_job: cfg.est_secs_per_job,
        }
    }

    /// Validate a purchase intent and enqueue it. The returned job id is the
    /// handle for all later polling.
    pub async fn enqueue_purchase(&self, user_id: Uuid) -> Result<AdmissionTicket, AdmissionError> {
        if !self.limiter.allow(user_id) {
            return Err(RejectReason::TooManyAttempts.into());
        }

        // Fast path: the cache remembers this user's live job.
        match self.status_cache.user_state(user_id) {
            Some(JobStatus::Queued) | Some(JobStatus::Processing) => {
                return Err(RejectReason::AlreadyPending.into());
            }
            Some(JobStatus::Completed) => {
                return Err(RejectReason::AlreadyPurchased.into());
            }
            // A failed attempt may try again.
            Some(JobStatus::Failed) | None => {}
        }

        let view = self
            .projection
            .get_sale_status(None)
            .await
            .map_err(AdmissionError::Engine)?
            .ok_or(RejectReason::NoActiveSale)?;
        if view.status != SaleStatus::Active {
            return Err(RejectReason::SaleNotOpen.into());
        }
        if view.available_quantity <= 0 {
            return Err(RejectReason::OutOfStock.into());
        }

        let job_id = Uuid::new_v4();
        let now = Utc::now();

        // Status write precedes the enqueue. See module docs.
        self.status_cache
            .put_queued(JobSnapshot::queued(job_id, user_id, now));

        let payload = PurchasePayload {
            job_id,
            user_id,
            product_id: view.product_id,
            sale_id: view.sale_id,
            enqueued_at: now,
        };
        let payload = serde_json::to_value(&payload).map_err(EngineError::from)?;

        let enqueued = self
            .queue
            .add_job(
                PURCHASE_JOB_TYPE,
                payload,
                JobOptions {
                    job_id: Some(job_id),
                    ..JobOptions::default()
                },
            )
            .await;

        if let Err(e) = enqueued {
            // Clean failure path (as opposed to a crash): drop the ghost
            // entry so the user can retry immediately.
            tracing::error!(%user_id, %job_id, error = %e, "enqueue failed after status write");
            self.status_cache.evict(job_id, user_id);
            return Err(RejectReason::Unavailable.into());
        }

        tracing::info!(%user_id, %job_id, "purchase admitted");
        Ok(AdmissionTicket {
            job_id,
            status: JobStatus::Queued,
            estimated_wait_secs: self.estimate_wait().await,
        })
    }

    /// Advisory: backlog × average service time. Best effort; a stats
    /// hiccup degrades to a single-job estimate rather than failing the
    /// admission.
    pub async fn estimate_wait(&self) -> f64 {
        match self.queue.get_stats().await {
            Ok(stats) => (stats.backlog().max(1)) as f64 * self.est_secs_per_job,
            Err(e) => {
                tracing::debug!(error = %e, "queue stats unavailable for wait estimate");
                self.est_secs_per_job
            }
        }
    }
}
