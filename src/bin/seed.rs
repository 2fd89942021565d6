//! Demo data seeder: one product with stock and an already-open sale
//! window. For local runs and load tests.
//!
//! ```text
//! DATABASE_URL=postgres://localhost/surgemart cargo run --bin seed
//! ```
//!
//! `SEED_STOCK` overrides the stock quantity (default 100);
//! `SEED_DURATION_SECS` the sale length (default 3600).

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use surgemart::config::DatabaseConfig;
use surgemart::store::{self, FlashSaleRepository, ProductRepository, schema};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?;
    let stock: i32 = std::env::var("SEED_STOCK")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(100);
    let duration_secs: i64 = std::env::var("SEED_DURATION_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3600);

    let pool = store::connect(&DatabaseConfig {
        url: database_url,
        max_connections: 2,
    })
    .await?;
    schema::init_schema(&pool).await?;

    let product = ProductRepository::create_with_stock(
        &pool,
        "Limited Edition Sneaker",
        "One colorway, one drop, no restock.",
        Decimal::new(9999, 2),
        stock,
    )
    .await?;

    let now = Utc::now();
    let sale = FlashSaleRepository::insert(
        &pool,
        product.product_id,
        now - Duration::seconds(60),
        now + Duration::seconds(duration_secs),
    )
    .await?;

    println!("product_id: {}", product.product_id);
    println!("sale_id:    {}", sale.sale_id);
    println!("stock:      {}", stock);
    println!("sale ends:  {}", sale.end_time.to_rfc3339());
    Ok(())
}
