//! Order repository.
//!
//! The insert path is the backstop for both business rules: the primary key
//! (order_id = job id) makes retried jobs idempotent, and the
//! (user_id, product_id) unique constraint refuses a second purchase that
//! slipped past the admission cache.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{Order, OrderStatus};

/// Outcome of a confirmed-order insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderInsert {
    /// New row written.
    Inserted,
    /// Same order_id already present: a retried job whose earlier attempt
    /// landed. Treat as the original success.
    DuplicateJob,
    /// (user_id, product_id) already taken by a different order: the user
    /// already purchased.
    DuplicateUser,
}

pub struct OrderRepository;

impl OrderRepository {
    /// Insert a confirmed order. Never raises a unique violation to the
    /// caller; both duplicate flavors are classified into [`OrderInsert`].
    pub async fn insert_confirmed<'e>(
        exec: impl PgExecutor<'e>,
        order_id: Uuid,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<OrderInsert, sqlx::Error> {
        let result = sqlx::query(
            r#"INSERT INTO orders (order_id, user_id, product_id, status)
               VALUES ($1, $2, $3, 'confirmed')"#,
        )
        .bind(order_id)
        .bind(user_id)
        .bind(product_id)
        .execute(exec)
        .await;

        match result {
            Ok(_) => Ok(OrderInsert::Inserted),
            Err(sqlx::Error::Database(db))
                if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
            {
                if db.constraint() == Some("orders_pkey") {
                    Ok(OrderInsert::DuplicateJob)
                } else {
                    Ok(OrderInsert::DuplicateUser)
                }
            }
            Err(e) => Err(e),
        }
    }

    /// The user's confirmed order for a product, if any.
    pub async fn find_confirmed(
        pool: &PgPool,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<Order>, sqlx::Error> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"SELECT order_id, user_id, product_id, status, created_at
               FROM orders
               WHERE user_id = $1 AND product_id = $2 AND status = 'confirmed'"#,
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    pub async fn get(pool: &PgPool, order_id: Uuid) -> Result<Option<Order>, sqlx::Error> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"SELECT order_id, user_id, product_id, status, created_at
               FROM orders WHERE order_id = $1"#,
        )
        .bind(order_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    /// Order counts per status for one product.
    pub async fn status_counts(
        pool: &PgPool,
        product_id: Uuid,
    ) -> Result<Vec<(OrderStatus, i64)>, sqlx::Error> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"SELECT status, COUNT(*) FROM orders WHERE product_id = $1 GROUP BY status"#,
        )
        .bind(product_id)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(status, count)| (OrderStatus::parse(&status), count))
            .collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    order_id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Order {
            order_id: row.order_id,
            user_id: row.user_id,
            product_id: row.product_id,
            status: OrderStatus::parse(&row.status),
            created_at: row.created_at,
        }
    }
}
