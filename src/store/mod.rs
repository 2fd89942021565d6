//! Persistence layer: connection pool, schema bootstrap, and one repository
//! per ownership domain.
//!
//! Repositories are plain structs with associated async functions over sqlx
//! executors. Each field has exactly one writer: the stock repository owns
//! `available_quantity`, the order repository owns order rows, the sale
//! repository owns sale windows.

pub mod orders;
pub mod products;
pub mod sales;
pub mod schema;
pub mod users;

pub use orders::{OrderInsert, OrderRepository};
pub use products::{ProductRepository, StockRepository};
pub use sales::FlashSaleRepository;
pub use users::UserRepository;

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;

/// Open the pool the engine runs on. Sized from config; the acquire
/// timeout bounds how long an admission or worker can stall on a saturated
/// pool before surfacing a transient error.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let pool = pool_options(config).connect(&config.url).await?;
    tracing::info!(
        max_connections = config.max_connections,
        "database pool ready"
    );
    Ok(pool)
}

/// Pool that defers connecting until first use. Tests and tooling.
pub fn connect_lazy(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    pool_options(config).connect_lazy(&config.url)
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(5))
}
