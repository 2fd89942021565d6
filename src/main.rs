//! Surgemart - Flash-Sale Purchase Engine
//!
//! Server entry point. Wiring order:
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Config  │───▶│ Database │───▶│  Queue + │───▶│ Gateway  │
//! │  (env)   │    │ (schema) │    │  Workers │    │  (HTTP)  │
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use surgemart::admission::AdmissionService;
use surgemart::auth::AuthService;
use surgemart::cache::{SaleStatusCache, StatusCache};
use surgemart::config::AppConfig;
use surgemart::gateway::{self, state::AppState};
use surgemart::projection::{SaleAdmin, SaleProjection};
use surgemart::queue::{self, PURCHASE_JOB_TYPE};
use surgemart::stats::StatsService;
use surgemart::store::{self, schema};
use surgemart::worker::{PurchaseWorker, spawn_maintenance};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    let _log_guard = surgemart::logging::init_logging(&config.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = config.queue.backend.as_str(),
        workers = config.queue.worker_concurrency,
        "starting surgemart"
    );

    // Database and schema
    let pool = store::connect(&config.database).await?;
    schema::init_schema(&pool).await?;

    // Caches
    let status_cache = Arc::new(StatusCache::new(Duration::from_secs(
        config.cache.status_ttl_secs,
    )));
    let sale_cache = Arc::new(SaleStatusCache::new(config.cache.sale_ttl_secs));

    // Queue and the purchase worker pool
    let job_queue = queue::build_queue(&config.queue, pool.clone());
    let worker = Arc::new(PurchaseWorker::new(
        pool.clone(),
        Arc::clone(&status_cache),
        Arc::clone(&sale_cache),
        config.queue.job_timeout(),
    ));
    job_queue
        .process(
            PURCHASE_JOB_TYPE,
            config.queue.worker_concurrency,
            worker.handler(),
        )
        .await?;
    let _maintenance = spawn_maintenance(
        Arc::clone(&job_queue),
        Arc::clone(&status_cache),
        Duration::from_secs(30),
    );

    // Read-side services
    let projection = Arc::new(SaleProjection::new(pool.clone(), Arc::clone(&sale_cache)));
    let sale_admin = Arc::new(SaleAdmin::new(pool.clone(), Arc::clone(&sale_cache)));
    let stats = Arc::new(StatsService::new(pool.clone()));

    // Admission and auth
    let admission = Arc::new(AdmissionService::new(
        Arc::clone(&job_queue),
        Arc::clone(&status_cache),
        Arc::clone(&projection),
        &config.admission,
    ));
    let auth = Arc::new(AuthService::new(pool.clone(), &config.auth));

    let state = Arc::new(AppState::new(
        pool,
        Arc::clone(&job_queue),
        status_cache,
        sale_cache,
        projection,
        sale_admin,
        stats,
        admission,
        auth,
    ));

    gateway::run_server(state, config.http.port).await?;

    // Gateway drained; stop intake and let in-flight jobs finish.
    tracing::info!("shutting down queue");
    job_queue.close().await;
    tracing::info!("bye");
    Ok(())
}
