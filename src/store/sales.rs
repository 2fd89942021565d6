//! Flash-sale repository: sale windows and their admin write path.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::FlashSale;

pub struct FlashSaleRepository;

impl FlashSaleRepository {
    pub async fn get(pool: &PgPool, sale_id: Uuid) -> Result<Option<FlashSale>, sqlx::Error> {
        let row: Option<SaleRow> = sqlx::query_as(
            r#"SELECT sale_id, product_id, start_time, end_time, created_at, updated_at
               FROM flash_sales WHERE sale_id = $1"#,
        )
        .bind(sale_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    /// The sale the read side projects: most recently created window.
    pub async fn latest(pool: &PgPool) -> Result<Option<FlashSale>, sqlx::Error> {
        let row: Option<SaleRow> = sqlx::query_as(
            r#"SELECT sale_id, product_id, start_time, end_time, created_at, updated_at
               FROM flash_sales ORDER BY created_at DESC LIMIT 1"#,
        )
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    pub async fn insert(
        pool: &PgPool,
        product_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<FlashSale, sqlx::Error> {
        let row: SaleRow = sqlx::query_as(
            r#"INSERT INTO flash_sales (sale_id, product_id, start_time, end_time)
               VALUES ($1, $2, $3, $4)
               RETURNING sale_id, product_id, start_time, end_time, created_at, updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(start_time)
        .bind(end_time)
        .fetch_one(pool)
        .await?;

        Ok(row.into())
    }

    /// Returns None when the sale id does not exist.
    pub async fn update(
        pool: &PgPool,
        sale_id: Uuid,
        product_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Option<FlashSale>, sqlx::Error> {
        let row: Option<SaleRow> = sqlx::query_as(
            r#"UPDATE flash_sales
               SET product_id = $2, start_time = $3, end_time = $4, updated_at = NOW()
               WHERE sale_id = $1
               RETURNING sale_id, product_id, start_time, end_time, created_at, updated_at"#,
        )
        .bind(sale_id)
        .bind(product_id)
        .bind(start_time)
        .bind(end_time)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    sale_id: Uuid,
    product_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SaleRow> for FlashSale {
    fn from(row: SaleRow) -> Self {
        FlashSale {
            sale_id: row.sale_id,
            product_id: row.product_id,
            start_time: row.start_time,
            end_time: row.end_time,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
