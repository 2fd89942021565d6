//! Error taxonomy for the purchase engine.
//!
//! Three layers:
//! - [`RejectReason`]: admission-time rejections, surfaced synchronously.
//! - [`FailureReason`]: terminal business outcomes of a purchase job,
//!   surfaced through the status cache. Never retried.
//! - [`EngineError`]: everything else. Transient variants are retried by the
//!   queue; fatal variants mark the job failed and expect human follow-up.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Admission-time rejection. The wire representation is the bare variant
/// name, which clients match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RejectReason {
    #[error("AlreadyPending")]
    AlreadyPending,
    #[error("AlreadyPurchased")]
    AlreadyPurchased,
    #[error("NoActiveSale")]
    NoActiveSale,
    #[error("SaleNotOpen")]
    SaleNotOpen,
    #[error("OutOfStock")]
    OutOfStock,
    #[error("TooManyAttempts")]
    TooManyAttempts,
    #[error("Unavailable")]
    Unavailable,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::AlreadyPending => "AlreadyPending",
            RejectReason::AlreadyPurchased => "AlreadyPurchased",
            RejectReason::NoActiveSale => "NoActiveSale",
            RejectReason::SaleNotOpen => "SaleNotOpen",
            RejectReason::OutOfStock => "OutOfStock",
            RejectReason::TooManyAttempts => "TooManyAttempts",
            RejectReason::Unavailable => "Unavailable",
        }
    }
}

/// Terminal business outcome of a purchase job. These must never trigger a
/// queue retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FailureReason {
    #[error("AlreadyPurchased")]
    AlreadyPurchased,
    #[error("OutOfStock")]
    OutOfStock,
    #[error("SaleNotOpen")]
    SaleNotOpen,
    #[error("Internal")]
    Internal,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::AlreadyPurchased => "AlreadyPurchased",
            FailureReason::OutOfStock => "OutOfStock",
            FailureReason::SaleNotOpen => "SaleNotOpen",
            FailureReason::Internal => "Internal",
        }
    }
}

/// Infrastructure-level error for stores, caches, and the queue.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl EngineError {
    /// Whether a queue retry can plausibly succeed. Deadlocks, connection
    /// drops, and pool timeouts are transient; constraint violations and
    /// validation failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Database(e) => is_transient_db_error(e),
            EngineError::Queue(_) => true,
            EngineError::Validation(_)
            | EngineError::NotFound(_)
            | EngineError::Serde(_)
            | EngineError::Invariant(_) => false,
        }
    }
}

/// Classify a sqlx error as retriable.
pub fn is_transient_db_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db) => {
            // 40001 serialization_failure, 40P01 deadlock_detected,
            // 57P03 cannot_connect_now
            matches!(db.code().as_deref(), Some("40001") | Some("40P01") | Some("57P03"))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_reason_wire_strings() {
        assert_eq!(RejectReason::AlreadyPending.as_str(), "AlreadyPending");
        assert_eq!(
            serde_json::to_value(RejectReason::OutOfStock).unwrap(),
            serde_json::json!("OutOfStock")
        );
    }

    #[test]
    fn failure_reason_round_trips() {
        let r: FailureReason = serde_json::from_value(serde_json::json!("SaleNotOpen")).unwrap();
        assert_eq!(r, FailureReason::SaleNotOpen);
    }

    #[test]
    fn validation_is_not_transient() {
        assert!(!EngineError::Validation("end before start".into()).is_transient());
    }

    #[test]
    fn queue_errors_are_transient() {
        assert!(EngineError::Queue("backend hiccup".into()).is_transient());
    }
}
