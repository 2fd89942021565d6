//! Core domain types: users, products, stock, sales, orders, purchase jobs.
//!
//! Statuses that live in the database are stored as text; the enums here own
//! the string conversions so repositories stay free of magic strings.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FailureReason;

// ============================================================
// Users
// ============================================================

/// User role. Admins may manage sales and read stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn parse(s: &str) -> Role {
        match s {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// A user. Created on first login, immutable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

// ============================================================
// Products and stock
// ============================================================

/// The product on sale. Immutable for the lifetime of a sale.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub product_id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Stock counters for one product.
///
/// `available_quantity` is owned by the stock store: nothing outside the
/// conditional-decrement / compensating-increment statements may write it.
#[derive(Debug, Clone, Serialize)]
pub struct Stock {
    pub product_id: Uuid,
    pub total_quantity: i32,
    pub available_quantity: i32,
    pub reserved_quantity: i32,
    pub updated_at: DateTime<Utc>,
}

// ============================================================
// Flash sales
// ============================================================

/// Derived sale state. Never stored: always a function of wall-clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Upcoming,
    Active,
    Ended,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Upcoming => "upcoming",
            SaleStatus::Active => "active",
            SaleStatus::Ended => "ended",
        }
    }
}

/// A sale window binding one product to a [start, end) interval.
#[derive(Debug, Clone, Serialize)]
pub struct FlashSale {
    pub sale_id: Uuid,
    pub product_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlashSale {
    /// Wall-clock state machine: upcoming before start, active inside
    /// [start, end), ended at or after end.
    pub fn status_at(&self, now: DateTime<Utc>) -> SaleStatus {
        if now < self.start_time {
            SaleStatus::Upcoming
        } else if now < self.end_time {
            SaleStatus::Active
        } else {
            SaleStatus::Ended
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == SaleStatus::Active
    }
}

// ============================================================
// Orders
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> OrderStatus {
        match s {
            "confirmed" => OrderStatus::Confirmed,
            "cancelled" => OrderStatus::Cancelled,
            _ => OrderStatus::Pending,
        }
    }
}

/// A confirmed (or pending/cancelled) purchase. At most one live order per
/// (user, product), enforced by a database unique constraint.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

// ============================================================
// Purchase jobs
// ============================================================

/// Lifecycle of a purchase job. Terminal states are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> JobStatus {
        match s {
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Queued,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Rank in the queued → processing → terminal progression. Used by the
    /// status cache to refuse regressions.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }
}

/// Payload carried by a purchase job through the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePayload {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub sale_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
}

/// Terminal result of a purchase job: an order id on success, a business
/// reason on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchased_at: Option<DateTime<Utc>>,
}

impl JobOutcome {
    pub fn confirmed(order_id: Uuid, purchased_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            order_id: Some(order_id),
            reason: None,
            purchased_at: Some(purchased_at),
        }
    }

    pub fn rejected(reason: FailureReason) -> Self {
        Self {
            success: false,
            order_id: None,
            reason: Some(reason),
            purchased_at: None,
        }
    }
}

/// Snapshot of a purchase job as the status cache mirrors it, keyed both by
/// job id and by user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn queued(job_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            user_id,
            status: JobStatus::Queued,
            outcome: None,
            updated_at: now,
        }
    }
}
