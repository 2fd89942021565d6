//! Purchase endpoints: admission and the two polling surfaces.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::gateway::state::AppState;
use crate::gateway::types::{ApiError, JobResponse, PurchaseAccepted, PurchaseStatusResponse};
use crate::models::{JobOutcome, JobSnapshot, JobStatus, PurchasePayload};
use crate::queue::JobState;
use crate::store::OrderRepository;

/// POST /purchase → 202 with the job handle.
pub async fn create_purchase(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<PurchaseAccepted>), ApiError> {
    let ticket = state.admission.enqueue_purchase(user.user_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(PurchaseAccepted {
            job_id: ticket.job_id,
            status: ticket.status,
            estimated_wait_time: ticket.estimated_wait_secs,
        }),
    ))
}

/// GET /purchase/status: the caller's own state, cache first, order store
/// as the fallback once the cache entry has aged out.
pub async fn purchase_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<PurchaseStatusResponse>, ApiError> {
    if let Some(snapshot) = state.status_cache.get_by_user(user.user_id) {
        let estimated_wait = match snapshot.status {
            JobStatus::Queued | JobStatus::Processing => {
                Some(state.admission.estimate_wait().await)
            }
            _ => None,
        };
        return Ok(Json(snapshot_response(snapshot, estimated_wait)));
    }

    // Cache miss: a confirmed order outlives any TTL.
    if let Some(view) = state.projection.get_sale_status(None).await? {
        if let Some(order) =
            OrderRepository::find_confirmed(&state.pool, user.user_id, view.product_id)
                .await
                .map_err(crate::error::EngineError::from)?
        {
            return Ok(Json(PurchaseStatusResponse {
                status: JobStatus::Completed.as_str().to_string(),
                job_id: Some(order.order_id),
                order_id: Some(order.order_id),
                purchased_at: Some(order.created_at),
                estimated_wait_time: None,
                reason: None,
            }));
        }
    }

    Ok(Json(PurchaseStatusResponse::none()))
}

/// GET /purchase/job/{job_id}. Unknown ids and other users' jobs are both
/// 404, so job ids are not enumerable.
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let job_id: Uuid = job_id
        .parse()
        .map_err(|_| ApiError::not_found("Job not found"))?;

    if let Some(snapshot) = state.status_cache.get_by_job(job_id) {
        if snapshot.user_id != user.user_id {
            return Err(ApiError::not_found("Job not found"));
        }
        let result = snapshot
            .outcome
            .as_ref()
            .and_then(|o| serde_json::to_value(o).ok());
        return Ok(Json(JobResponse {
            job_id,
            status: snapshot.status,
            result,
            enqueued_at: snapshot.updated_at,
            attempts: 0,
        }));
    }

    // Cache aged out: fall back to the queue's own record.
    let record = state
        .queue
        .get_job(job_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    let owner = serde_json::from_value::<PurchasePayload>(record.payload.clone())
        .map(|p| p.user_id)
        .ok();
    if owner != Some(user.user_id) {
        return Err(ApiError::not_found("Job not found"));
    }

    Ok(Json(JobResponse {
        job_id,
        status: match record.state {
            JobState::Waiting => JobStatus::Queued,
            JobState::Active => JobStatus::Processing,
            JobState::Completed => JobStatus::Completed,
            JobState::Failed => JobStatus::Failed,
        },
        result: record.result,
        enqueued_at: record.enqueued_at,
        attempts: record.attempts,
    }))
}

fn snapshot_response(snapshot: JobSnapshot, estimated_wait: Option<f64>) -> PurchaseStatusResponse {
    let JobOutcome {
        order_id,
        reason,
        purchased_at,
        ..
    } = snapshot.outcome.unwrap_or(JobOutcome {
        success: false,
        order_id: None,
        reason: None,
        purchased_at: None,
    });

    PurchaseStatusResponse {
        status: snapshot.status.as_str().to_string(),
        job_id: Some(snapshot.job_id),
        order_id,
        purchased_at,
        estimated_wait_time: estimated_wait,
        reason,
    }
}
