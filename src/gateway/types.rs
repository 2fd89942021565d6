//! Request/response DTOs and the unified error type for the HTTP surface.
//!
//! All bodies are camelCase JSON; times are ISO-8601 UTC; ids are UUIDs.
//! Errors serialize as `{"error": "<message>"}` with the status code
//! carrying the semantics.

use axum::{Json, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::admission::AdmissionError;
use crate::error::{EngineError, FailureReason, RejectReason};
use crate::models::{JobStatus, SaleStatus};
use crate::projection::SaleStatusView;

// ============================================================
// ApiError
// ============================================================

/// Unified API error with automatic IntoResponse.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(msg) => ApiError::bad_request(msg),
            EngineError::NotFound(msg) => ApiError::not_found(msg),
            other => {
                tracing::error!(error = %other, "internal error");
                ApiError::internal("Internal server error")
            }
        }
    }
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::Rejected(reason) => {
                let status = match reason {
                    RejectReason::AlreadyPending
                    | RejectReason::AlreadyPurchased
                    | RejectReason::OutOfStock => StatusCode::CONFLICT,
                    RejectReason::NoActiveSale | RejectReason::SaleNotOpen => {
                        StatusCode::BAD_REQUEST
                    }
                    RejectReason::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
                    RejectReason::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                };
                ApiError::new(status, reason.as_str())
            }
            AdmissionError::Engine(e) => e.into(),
        }
    }
}

// ============================================================
// Auth DTOs
// ============================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    /// Optional requested role; `"admin"` demands the admin account.
    #[serde(default)]
    pub user_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user_type: String,
    pub email: String,
    pub user_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub valid: bool,
    pub user_id: Uuid,
    pub user_type: String,
    pub email: String,
}

// ============================================================
// Purchase DTOs
// ============================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseAccepted {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// Advisory, in seconds.
    pub estimated_wait_time: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseStatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchased_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl PurchaseStatusResponse {
    pub fn none() -> Self {
        Self {
            status: "none".to_string(),
            job_id: None,
            order_id: None,
            purchased_at: None,
            estimated_wait_time: None,
            reason: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
}

// ============================================================
// Sale DTOs
// ============================================================

/// Envelope for the status endpoint: `{"data": <view or null>}`.
#[derive(Debug, Serialize)]
pub struct SaleStatusEnvelope {
    pub data: Option<SaleStatusView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSaleRequest {
    #[serde(default)]
    pub sale_id: Option<Uuid>,
    pub product_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleResponse {
    pub sale_id: Uuid,
    pub product_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SaleStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_accepted_shape() {
        let body = PurchaseAccepted {
            job_id: Uuid::new_v4(),
            status: JobStatus::Queued,
            estimated_wait_time: 1.5,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "queued");
        assert!(json.get("jobId").is_some());
        assert!(json.get("estimatedWaitTime").is_some());
    }

    #[test]
    fn reject_reasons_map_to_status_codes() {
        let conflict: ApiError = AdmissionError::Rejected(RejectReason::AlreadyPending).into();
        assert_eq!(conflict.status, StatusCode::CONFLICT);

        let bad: ApiError = AdmissionError::Rejected(RejectReason::SaleNotOpen).into();
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);

        let limited: ApiError = AdmissionError::Rejected(RejectReason::TooManyAttempts).into();
        assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);

        let unavailable: ApiError = AdmissionError::Rejected(RejectReason::Unavailable).into();
        assert_eq!(unavailable.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn empty_status_body() {
        let json = serde_json::to_value(PurchaseStatusResponse::none()).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "none" }));
    }
}
