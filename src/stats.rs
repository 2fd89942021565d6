//! Admin-facing statistics over orders and stock. Read-only; not
//! latency-critical, so it goes straight to the database.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::OrderStatus;
use crate::store::{FlashSaleRepository, OrderRepository, ProductRepository, StockRepository};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleStats {
    pub total_orders: i64,
    pub confirmed_orders: i64,
    pub pending_orders: i64,
    pub failed_orders: i64,
    pub total_quantity: i32,
    pub available_quantity: i32,
    pub sold_quantity: i64,
    pub total_revenue: Decimal,
}

pub struct StatsService {
    pool: PgPool,
}

impl StatsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Stats for one sale. `Ok(None)` when the sale does not exist.
    pub async fn sale_stats(&self, sale_id: Uuid) -> Result<Option<SaleStats>, EngineError> {
        let Some(sale) = FlashSaleRepository::get(&self.pool, sale_id).await? else {
            return Ok(None);
        };

        let product = ProductRepository::get_by_id(&self.pool, sale.product_id)
            .await?
            .ok_or_else(|| {
                EngineError::Invariant(format!("sale {} references missing product", sale_id))
            })?;
        let stock = StockRepository::get(&self.pool, sale.product_id)
            .await?
            .ok_or_else(|| {
                EngineError::Invariant(format!("product {} has no stock row", sale.product_id))
            })?;

        let counts = OrderRepository::status_counts(&self.pool, sale.product_id).await?;
        let mut confirmed = 0i64;
        let mut pending = 0i64;
        let mut cancelled = 0i64;
        for (status, count) in counts {
            match status {
                OrderStatus::Confirmed => confirmed += count,
                OrderStatus::Pending => pending += count,
                OrderStatus::Cancelled => cancelled += count,
            }
        }

        Ok(Some(SaleStats {
            total_orders: confirmed + pending + cancelled,
            confirmed_orders: confirmed,
            pending_orders: pending,
            failed_orders: cancelled,
            total_quantity: stock.total_quantity,
            available_quantity: stock.available_quantity,
            sold_quantity: confirmed,
            total_revenue: product.price * Decimal::from(confirmed),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_serialize_camel_case() {
        let stats = SaleStats {
            total_orders: 3,
            confirmed_orders: 2,
            pending_orders: 1,
            failed_orders: 0,
            total_quantity: 10,
            available_quantity: 8,
            sold_quantity: 2,
            total_revenue: Decimal::new(1998, 2),
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["confirmedOrders"], 2);
        assert_eq!(json["soldQuantity"], 2);
        assert_eq!(json["totalRevenue"], serde_json::json!("19.98"));
    }
}
