//! Point-of-sale route handlers.
//!
//! A sale is paid at the counter and handed over on the spot, so it is
//! recorded as delivered straight away.

use axum::extract::State;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireStaff;
use crate::models::OrderWithItems;
use crate::services::checkout::{CheckoutService, PosSale};
use crate::state::AppState;

use super::response::{ApiJson, ApiResponse};

/// Record an in-store sale.
///
/// POST /api/pos/sales
#[instrument(skip_all, fields(cashier_id = %cashier.id, lines = sale.items.len()))]
pub async fn create_sale(
    State(state): State<AppState>,
    RequireStaff(cashier): RequireStaff,
    ApiJson(sale): ApiJson<PosSale>,
) -> Result<ApiResponse<OrderWithItems>> {
    let order = CheckoutService::new(state.pool(), state.pricing())
        .place_pos(cashier.id, &sale)
        .await?;
    Ok(ApiResponse::created(order))
}
