//! Sale-status projection and the admin write path for sale windows.
//!
//! The projection is the heaviest read surface during a sale. It reads
//! through [`SaleStatusCache`] with a short TTL; the countdown fields are
//! absolute-time derived so clients can render their own timers without
//! server drift.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::cache::SaleStatusCache;
use crate::error::EngineError;
use crate::models::{FlashSale, SaleStatus};
use crate::store::{FlashSaleRepository, ProductRepository, StockRepository};

/// What `GET /flash-sale/status` serves.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleStatusView {
    pub sale_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_price: Decimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SaleStatus,
    pub total_quantity: i32,
    pub available_quantity: i32,
    /// Whole seconds until the window opens; 0 once open.
    pub time_until_start: i64,
    /// Whole seconds until the window closes; 0 once closed.
    pub time_until_end: i64,
}

impl SaleStatusView {
    fn build(
        sale: &FlashSale,
        product_name: String,
        product_price: Decimal,
        total_quantity: i32,
        available_quantity: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            sale_id: sale.sale_id,
            product_id: sale.product_id,
            product_name,
            product_price,
            start_time: sale.start_time,
            end_time: sale.end_time,
            status: sale.status_at(now),
            total_quantity,
            available_quantity,
            time_until_start: (sale.start_time - now).num_seconds().max(0),
            time_until_end: (sale.end_time - now).num_seconds().max(0),
        }
    }
}

/// Read side: current or addressed sale, served through the TTL cache.
pub struct SaleProjection {
    pool: PgPool,
    cache: Arc<SaleStatusCache>,
}

impl SaleProjection {
    pub fn new(pool: PgPool, cache: Arc<SaleStatusCache>) -> Self {
        Self { pool, cache }
    }

    /// The projected status of `sale_id`, or of the latest sale when none is
    /// given. `Ok(None)` means no sale exists.
    pub async fn get_sale_status(
        &self,
        sale_id: Option<Uuid>,
    ) -> Result<Option<SaleStatusView>, EngineError> {
        if let Some(cached) = self.cache.get(sale_id).await {
            return Ok(cached);
        }

        let sale = match sale_id {
            Some(id) => FlashSaleRepository::get(&self.pool, id).await?,
            None => FlashSaleRepository::latest(&self.pool).await?,
        };

        let view = match sale {
            Some(sale) => Some(self.build_view(&sale).await?),
            None => None,
        };

        self.cache.put(sale_id, view.clone()).await;
        Ok(view)
    }

    async fn build_view(&self, sale: &FlashSale) -> Result<SaleStatusView, EngineError> {
        let product = ProductRepository::get_by_id(&self.pool, sale.product_id)
            .await?
            .ok_or_else(|| {
                EngineError::Invariant(format!("sale {} references missing product", sale.sale_id))
            })?;
        let stock = StockRepository::get(&self.pool, sale.product_id)
            .await?
            .ok_or_else(|| {
                EngineError::Invariant(format!("product {} has no stock row", sale.product_id))
            })?;

        Ok(SaleStatusView::build(
            sale,
            product.name,
            product.price,
            stock.total_quantity,
            stock.available_quantity,
            Utc::now(),
        ))
    }
}

/// Admin write path: create or update a sale window.
pub struct SaleAdmin {
    pool: PgPool,
    cache: Arc<SaleStatusCache>,
}

impl SaleAdmin {
    pub fn new(pool: PgPool, cache: Arc<SaleStatusCache>) -> Self {
        Self { pool, cache }
    }

    /// With `sale_id` this updates an existing window; without it a new one
    /// is created. Validates the product (and its stock row) exists and
    /// start < end, then invalidates the projection.
    pub async fn create_or_update(
        &self,
        sale_id: Option<Uuid>,
        product_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<FlashSale, EngineError> {
        if end_time <= start_time {
            return Err(EngineError::Validation(
                "End time must be after start time".to_string(),
            ));
        }
        if ProductRepository::get_by_id(&self.pool, product_id)
            .await?
            .is_none()
        {
            return Err(EngineError::Validation(format!(
                "Product {product_id} does not exist"
            )));
        }
        if StockRepository::get(&self.pool, product_id).await?.is_none() {
            return Err(EngineError::Validation(format!(
                "Product {product_id} has no stock configured"
            )));
        }

        let sale = match sale_id {
            Some(id) => FlashSaleRepository::update(&self.pool, id, product_id, start_time, end_time)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("Sale {id} does not exist")))?,
            None => {
                FlashSaleRepository::insert(&self.pool, product_id, start_time, end_time).await?
            }
        };

        self.cache.invalidate(sale.sale_id).await;
        tracing::info!(
            sale_id = %sale.sale_id,
            product_id = %sale.product_id,
            start = %sale.start_time,
            end = %sale.end_time,
            "sale window saved"
        );
        Ok(sale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sale_at(now: DateTime<Utc>, start_offset: i64, end_offset: i64) -> FlashSale {
        FlashSale {
            sale_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            start_time: now + Duration::seconds(start_offset),
            end_time: now + Duration::seconds(end_offset),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn countdowns_clamp_at_zero() {
        let now = Utc::now();
        let sale = sale_at(now, -120, -60);
        let view = SaleStatusView::build(&sale, "widget".into(), Decimal::new(999, 2), 10, 0, now);
        assert_eq!(view.status, SaleStatus::Ended);
        assert_eq!(view.time_until_start, 0);
        assert_eq!(view.time_until_end, 0);
    }

    #[test]
    fn upcoming_sale_counts_down_to_both_edges() {
        let now = Utc::now();
        let sale = sale_at(now, 60, 3600);
        let view = SaleStatusView::build(&sale, "widget".into(), Decimal::new(999, 2), 10, 10, now);
        assert_eq!(view.status, SaleStatus::Upcoming);
        assert_eq!(view.time_until_start, 60);
        assert_eq!(view.time_until_end, 3600);
    }

    #[tokio::test]
    async fn inverted_window_is_refused_before_any_query() {
        let pool = crate::store::connect_lazy(&crate::config::DatabaseConfig {
            url: "postgres://127.0.0.1:1/unreachable".to_string(),
            max_connections: 1,
        })
        .unwrap();
        let admin = SaleAdmin::new(pool, Arc::new(SaleStatusCache::new(10)));

        let now = Utc::now();
        let err = admin
            .create_or_update(None, Uuid::new_v4(), now + Duration::seconds(10), now)
            .await
            .unwrap_err();
        match err {
            EngineError::Validation(msg) => {
                assert_eq!(msg, "End time must be after start time");
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn view_serializes_camel_case() {
        let now = Utc::now();
        let sale = sale_at(now, -60, 3600);
        let view = SaleStatusView::build(&sale, "widget".into(), Decimal::new(1050, 2), 5, 3, now);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["availableQuantity"], 3);
        assert_eq!(json["productPrice"], serde_json::json!("10.50"));
        assert!(json.get("timeUntilEnd").is_some());
    }
}
