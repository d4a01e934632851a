//! Staff dashboard route handlers.

use axum::extract::State;
use serde::Deserialize;
use tracing::instrument;

use kitshop_core::OrderStatus;

use crate::db::orders::OrderRepository;
use crate::db::products::ProductRepository;
use crate::error::Result;
use crate::middleware::RequireStaff;
use crate::models::{Order, StoreSummary};
use crate::state::AppState;

use super::response::{ApiQuery, ApiResponse, Page};

/// `GET /api/admin/orders` query string.
#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// All orders, optionally of one status, newest first.
///
/// GET /api/admin/orders?status=&limit=&offset=
#[instrument(skip(state, staff), fields(staff_id = %staff.id))]
pub async fn orders(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    ApiQuery(query): ApiQuery<OrderQuery>,
) -> Result<ApiResponse<Vec<Order>>> {
    let page = Page::new(query.limit, query.offset);
    let orders = OrderRepository::new(state.pool())
        .list_all(query.status, page.limit, page.offset)
        .await?;

    Ok(ApiResponse::ok(orders))
}

/// Order counts, revenue and stock alerts.
///
/// GET /api/admin/summary
#[instrument(skip_all, fields(staff_id = %staff.id))]
pub async fn summary(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
) -> Result<ApiResponse<StoreSummary>> {
    let orders = OrderRepository::new(state.pool());
    let products = ProductRepository::new(state.pool());

    let (orders_by_status, revenue, active_products, low_stock) = tokio::try_join!(
        orders.status_counts(),
        orders.revenue(),
        products.count_active(),
        products.low_stock(),
    )?;

    Ok(ApiResponse::ok(StoreSummary {
        orders_by_status,
        revenue,
        active_products,
        low_stock,
    }))
}
