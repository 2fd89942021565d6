//! Admin surface: sale lifecycle and stats. All routes sit behind the JWT
//! and admin-role middleware layers.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::gateway::state::AppState;
use crate::gateway::types::{ApiError, CreateSaleRequest, SaleResponse};
use crate::projection::SaleStatusView;
use crate::stats::SaleStats;

/// POST /admin/flash-sale. With saleId updates, without creates.
pub async fn create_sale(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSaleRequest>,
) -> Result<Json<SaleResponse>, ApiError> {
    let sale = state
        .sale_admin
        .create_or_update(req.sale_id, req.product_id, req.start_time, req.end_time)
        .await?;

    Ok(Json(SaleResponse {
        sale_id: sale.sale_id,
        product_id: sale.product_id,
        start_time: sale.start_time,
        end_time: sale.end_time,
        status: sale.status_at(Utc::now()),
    }))
}

/// GET /admin/flash-sale/{sale_id}. Non-UUID ids are 400, unknown 404.
pub async fn get_sale(
    State(state): State<Arc<AppState>>,
    Path(sale_id): Path<String>,
) -> Result<Json<SaleStatusView>, ApiError> {
    let sale_id: Uuid = sale_id
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid sale id"))?;

    let view = state
        .projection
        .get_sale_status(Some(sale_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Sale not found"))?;

    Ok(Json(view))
}

/// GET /admin/flash-sale/{sale_id}/stats.
pub async fn sale_stats(
    State(state): State<Arc<AppState>>,
    Path(sale_id): Path<String>,
) -> Result<Json<SaleStats>, ApiError> {
    let sale_id: Uuid = sale_id
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid sale id"))?;

    let stats = state
        .stats
        .sale_stats(sale_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Sale not found"))?;

    Ok(Json(stats))
}
