//! Short-lived projections serving the high-traffic read paths.
//!
//! Two caches with different disciplines:
//!
//! - [`StatusCache`]: per-user and per-job purchase state. Written by the
//!   admission service (initial queued entry) and the worker (every later
//!   transition). Single-key read-your-writes, monotonic transitions, and
//!   terminal immutability are enforced here.
//! - [`SaleStatusCache`]: the sale-status projection. Pure read-through with
//!   a short TTL; every mutation path (purchase success, admin edit) must
//!   invalidate it.

use std::time::{Duration, Instant};

use cached::{Cached, TimedCache};
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{JobSnapshot, JobStatus};
use crate::projection::SaleStatusView;

struct Entry {
    snapshot: JobSnapshot,
    expires_at: Instant,
}

impl Entry {
    fn live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// In-memory mirror of purchase-job state, keyed by job id and by user id.
pub struct StatusCache {
    by_job: DashMap<Uuid, Entry>,
    by_user: DashMap<Uuid, Entry>,
    ttl: Duration,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            by_job: DashMap::new(),
            by_user: DashMap::new(),
            ttl,
        }
    }

    /// Record the initial queued snapshot. The admission service owns this
    /// write; it must land before the job is enqueued so a concurrent second
    /// submission observes the pending state.
    pub fn put_queued(&self, snapshot: JobSnapshot) {
        let expires_at = Instant::now() + self.ttl;
        self.by_job.insert(
            snapshot.job_id,
            Entry { snapshot: snapshot.clone(), expires_at },
        );
        self.by_user.insert(
            snapshot.user_id,
            Entry { snapshot, expires_at },
        );
    }

    /// Apply a later transition from the worker. Returns false (and leaves
    /// the cache untouched) when the write would regress the
    /// queued → processing → terminal progression or overwrite a terminal
    /// state for the same job.
    pub fn transition(&self, snapshot: JobSnapshot) -> bool {
        if !self.admissible(&snapshot) {
            tracing::warn!(
                job_id = %snapshot.job_id,
                status = snapshot.status.as_str(),
                "refusing non-monotonic status transition"
            );
            return false;
        }

        let expires_at = Instant::now() + self.ttl;
        self.by_job.insert(
            snapshot.job_id,
            Entry { snapshot: snapshot.clone(), expires_at },
        );
        // The user key tracks the user's latest job; never clobber a
        // different, newer job's entry with an old job's transition.
        match self.by_user.entry(snapshot.user_id) {
            dashmap::mapref::entry::Entry::Occupied(occ)
                if occ.get().live() && occ.get().snapshot.job_id != snapshot.job_id => {}
            other => {
                other.insert(Entry { snapshot, expires_at });
            }
        }
        true
    }

    fn admissible(&self, snapshot: &JobSnapshot) -> bool {
        match self.by_job.get(&snapshot.job_id) {
            Some(existing) if existing.live() => {
                let current = existing.snapshot.status;
                !current.is_terminal() && snapshot.status.rank() >= current.rank()
            }
            _ => true,
        }
    }

    pub fn get_by_job(&self, job_id: Uuid) -> Option<JobSnapshot> {
        Self::read(&self.by_job, job_id)
    }

    pub fn get_by_user(&self, user_id: Uuid) -> Option<JobSnapshot> {
        Self::read(&self.by_user, user_id)
    }

    fn read(map: &DashMap<Uuid, Entry>, key: Uuid) -> Option<JobSnapshot> {
        let expired = match map.get(&key) {
            Some(entry) if entry.live() => return Some(entry.snapshot.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            map.remove_if(&key, |_, entry| !entry.live());
        }
        None
    }

    /// Remove a job's entries. Only for the admission failure path, where
    /// the enqueue never happened and the queued entry is a ghost.
    pub fn evict(&self, job_id: Uuid, user_id: Uuid) {
        self.by_job.remove(&job_id);
        self.by_user
            .remove_if(&user_id, |_, entry| entry.snapshot.job_id == job_id);
    }

    /// Drop expired entries. Called periodically; reads also expire lazily.
    pub fn sweep(&self) {
        self.by_job.retain(|_, entry| entry.live());
        self.by_user.retain(|_, entry| entry.live());
    }

    /// Whether the user currently has a live pending/terminal entry.
    pub fn user_state(&self, user_id: Uuid) -> Option<JobStatus> {
        self.get_by_user(user_id).map(|s| s.status)
    }
}

/// TTL cache for the sale-status projection.
///
/// Serves the heaviest read traffic during a sale; readers accept a bounded
/// staleness window on `availableQuantity`. Any path that changes what the
/// projection would return must call [`SaleStatusCache::invalidate`].
pub struct SaleStatusCache {
    inner: Mutex<TimedCache<String, Option<SaleStatusView>>>,
}

/// Cache key for "whatever the current sale is".
const CURRENT_KEY: &str = "current";

impl SaleStatusCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            inner: Mutex::new(TimedCache::with_lifespan(ttl_secs)),
        }
    }

    pub async fn get(&self, sale_id: Option<Uuid>) -> Option<Option<SaleStatusView>> {
        let key = Self::key(sale_id);
        self.inner.lock().await.cache_get(&key).cloned()
    }

    pub async fn put(&self, sale_id: Option<Uuid>, view: Option<SaleStatusView>) {
        let key = Self::key(sale_id);
        self.inner.lock().await.cache_set(key, view);
    }

    /// Invalidate one sale's entry and the current-sale entry.
    pub async fn invalidate(&self, sale_id: Uuid) {
        let mut cache = self.inner.lock().await;
        cache.cache_remove(&sale_id.to_string());
        cache.cache_remove(&CURRENT_KEY.to_string());
    }

    fn key(sale_id: Option<Uuid>) -> String {
        match sale_id {
            Some(id) => id.to_string(),
            None => CURRENT_KEY.to_string(),
        }
    }
}
