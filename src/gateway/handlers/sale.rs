//! Public sale-status endpoint: the heaviest read path during a sale.

use axum::{Json, extract::State};
use std::sync::Arc;

use crate::gateway::state::AppState;
use crate::gateway::types::{ApiError, SaleStatusEnvelope};

/// GET /flash-sale/status. `data` is null when no sale exists.
pub async fn flash_sale_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SaleStatusEnvelope>, ApiError> {
    let view = state.projection.get_sale_status(None).await?;
    Ok(Json(SaleStatusEnvelope { data: view }))
}
