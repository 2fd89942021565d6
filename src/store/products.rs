//! Product and stock repositories.
//!
//! The stock repository is the single writer of `available_quantity`. The
//! conditional decrement is the authoritative oversell guard: it only
//! succeeds while the counter is positive, and the caller must check
//! rows-affected. The advisory-lock helper serializes whole critical
//! sections per product across every worker process.

use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{Product, Stock};

pub struct ProductRepository;

impl ProductRepository {
    pub async fn get_by_id(pool: &PgPool, product_id: Uuid) -> Result<Option<Product>, sqlx::Error> {
        let row: Option<ProductRow> = sqlx::query_as(
            r#"SELECT product_id, name, description, price, created_at
               FROM products WHERE product_id = $1"#,
        )
        .bind(product_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    /// Insert a product with its stock row in one transaction. Seeder/admin
    /// path only.
    pub async fn create_with_stock(
        pool: &PgPool,
        name: &str,
        description: &str,
        price: Decimal,
        quantity: i32,
    ) -> Result<Product, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let row: ProductRow = sqlx::query_as(
            r#"INSERT INTO products (product_id, name, description, price)
               VALUES ($1, $2, $3, $4)
               RETURNING product_id, name, description, price, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(price)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"INSERT INTO stock (product_id, total_quantity, available_quantity)
               VALUES ($1, $2, $2)"#,
        )
        .bind(row.product_id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }
}

pub struct StockRepository;

impl StockRepository {
    pub async fn get<'e>(
        exec: impl PgExecutor<'e>,
        product_id: Uuid,
    ) -> Result<Option<Stock>, sqlx::Error> {
        let row: Option<StockRow> = sqlx::query_as(
            r#"SELECT product_id, total_quantity, available_quantity, reserved_quantity, updated_at
               FROM stock WHERE product_id = $1"#,
        )
        .bind(product_id)
        .fetch_optional(exec)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    /// Read just the available counter.
    pub async fn available<'e>(
        exec: impl PgExecutor<'e>,
        product_id: Uuid,
    ) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar(r#"SELECT available_quantity FROM stock WHERE product_id = $1"#)
            .bind(product_id)
            .fetch_optional(exec)
            .await
    }

    /// Conditional decrement. Returns true when exactly one row was updated,
    /// false when the guard (`available_quantity > 0`) refused, meaning out of stock.
    pub async fn try_decrement<'e>(
        exec: impl PgExecutor<'e>,
        product_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE stock
               SET available_quantity = available_quantity - 1, updated_at = NOW()
               WHERE product_id = $1 AND available_quantity > 0"#,
        )
        .bind(product_id)
        .execute(exec)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Take the per-product advisory lock for the current transaction.
    /// Released automatically on commit or rollback.
    pub async fn lock_product<'e>(
        exec: impl PgExecutor<'e>,
        product_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(r#"SELECT pg_advisory_xact_lock($1)"#)
            .bind(advisory_key(product_id))
            .execute(exec)
            .await?;
        Ok(())
    }
}

/// Derive a stable 64-bit advisory-lock key from a product id.
pub fn advisory_key(product_id: Uuid) -> i64 {
    let bytes = product_id.as_bytes();
    i64::from_be_bytes(bytes[..8].try_into().expect("uuid has 16 bytes"))
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    product_id: Uuid,
    name: String,
    description: String,
    price: Decimal,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            product_id: row.product_id,
            name: row.name,
            description: row.description,
            price: row.price,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    product_id: Uuid,
    total_quantity: i32,
    available_quantity: i32,
    reserved_quantity: i32,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<StockRow> for Stock {
    fn from(row: StockRow) -> Self {
        Stock {
            product_id: row.product_id,
            total_quantity: row.total_quantity,
            available_quantity: row.available_quantity,
            reserved_quantity: row.reserved_quantity,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advisory_key_is_stable() {
        let id = Uuid::new_v4();
        assert_eq!(advisory_key(id), advisory_key(id));
    }

    #[test]
    fn advisory_key_differs_across_products() {
        // Collisions are possible in principle but must not happen for
        // distinct random ids in practice.
        assert_ne!(advisory_key(Uuid::new_v4()), advisory_key(Uuid::new_v4()));
    }
}
