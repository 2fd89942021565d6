use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;

use crate::admission::AdmissionService;
use crate::auth::AuthService;
use crate::cache::{SaleStatusCache, StatusCache};
use crate::projection::{SaleAdmin, SaleProjection};
use crate::queue::JobQueue;
use crate::stats::StatsService;

/// Gateway application state (shared). One constructed context instead of
/// globals: pool, queue, caches, and the services built over them.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub queue: Arc<dyn JobQueue>,
    pub status_cache: Arc<StatusCache>,
    pub sale_cache: Arc<SaleStatusCache>,
    pub projection: Arc<SaleProjection>,
    pub sale_admin: Arc<SaleAdmin>,
    pub stats: Arc<StatsService>,
    pub admission: Arc<AdmissionService>,
    pub auth: Arc<AuthService>,
    pub started_at: Instant,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        queue: Arc<dyn JobQueue>,
        status_cache: Arc<StatusCache>,
        sale_cache: Arc<SaleStatusCache>,
        projection: Arc<SaleProjection>,
        sale_admin: Arc<SaleAdmin>,
        stats: Arc<StatsService>,
        admission: Arc<AdmissionService>,
        auth: Arc<AuthService>,
    ) -> Self {
        Self {
            pool,
            queue,
            status_cache,
            sale_cache,
            projection,
            sale_admin,
            stats,
            admission,
            auth,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
