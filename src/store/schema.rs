//! Schema bootstrap for the purchase engine.
//!
//! Idempotent: every statement is `IF NOT EXISTS`. The constraints here are
//! load-bearing: the check on `available_quantity` and the unique
//! (user_id, product_id) pair are the last line of defence behind the
//! worker's critical section.

use anyhow::Result;
use sqlx::PgPool;

/// Initialize all tables and indexes.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Initializing database schema...");

    for (name, ddl) in [
        ("users", CREATE_USERS_TABLE),
        ("products", CREATE_PRODUCTS_TABLE),
        ("stock", CREATE_STOCK_TABLE),
        ("flash_sales", CREATE_FLASH_SALES_TABLE),
        ("orders", CREATE_ORDERS_TABLE),
        ("purchase_jobs", CREATE_PURCHASE_JOBS_TABLE),
        ("purchase_jobs claim index", CREATE_PURCHASE_JOBS_CLAIM_INDEX),
    ] {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", name, e))?;
    }

    tracing::info!("Database schema initialized");
    Ok(())
}

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id    UUID PRIMARY KEY,
    email      TEXT NOT NULL UNIQUE,
    role       TEXT NOT NULL DEFAULT 'user',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_PRODUCTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    product_id  UUID PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    price       NUMERIC(12,2) NOT NULL CHECK (price >= 0),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_STOCK_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS stock (
    product_id         UUID PRIMARY KEY REFERENCES products(product_id),
    total_quantity     INT NOT NULL CHECK (total_quantity >= 0),
    available_quantity INT NOT NULL CHECK (available_quantity >= 0),
    reserved_quantity  INT NOT NULL DEFAULT 0 CHECK (reserved_quantity >= 0),
    updated_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK (available_quantity <= total_quantity)
)
"#;

const CREATE_FLASH_SALES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS flash_sales (
    sale_id    UUID PRIMARY KEY,
    product_id UUID NOT NULL REFERENCES products(product_id),
    start_time TIMESTAMPTZ NOT NULL,
    end_time   TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK (start_time < end_time)
)
"#;

const CREATE_ORDERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    order_id   UUID PRIMARY KEY,
    user_id    UUID NOT NULL REFERENCES users(user_id),
    product_id UUID NOT NULL REFERENCES products(product_id),
    status     TEXT NOT NULL DEFAULT 'confirmed',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT orders_user_product_key UNIQUE (user_id, product_id)
)
"#;

const CREATE_PURCHASE_JOBS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS purchase_jobs (
    job_id       UUID PRIMARY KEY,
    job_type     TEXT NOT NULL,
    payload      JSONB NOT NULL,
    priority     INT NOT NULL DEFAULT 0,
    status       TEXT NOT NULL DEFAULT 'queued',
    attempts     INT NOT NULL DEFAULT 0,
    max_attempts INT NOT NULL DEFAULT 5,
    scheduled_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    last_error   TEXT,
    result       JSONB
)
"#;

const CREATE_PURCHASE_JOBS_CLAIM_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS purchase_jobs_claim_idx
    ON purchase_jobs (status, scheduled_at, priority DESC, created_at)
"#;
