//! Order route handlers.
//!
//! Checkout turns the stored cart into a pending order. Sending an
//! `Idempotency-Key` header makes retries safe: a repeated key returns the
//! order created the first time, with 200 instead of 201.

use axum::{
    extract::State,
    http::{HeaderMap, HeaderName},
};
use serde::Deserialize;
use tracing::instrument;

use kitshop_core::{OrderId, OrderStatus};

use crate::db::orders::OrderRepository;
use crate::error::{AppError, Result};
use crate::middleware::{RequireAuth, RequireStaff};
use crate::models::{CurrentUser, Order, OrderWithItems};
use crate::services::checkout::{CheckoutService, OnlineCheckout};
use crate::state::AppState;

use super::response::{ApiJson, ApiPath, ApiQuery, ApiResponse, PageQuery};

pub const IDEMPOTENCY_KEY_HEADER: HeaderName = HeaderName::from_static("idempotency-key");

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Body of `PATCH /api/orders/{id}/status`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
}

/// Read and validate the `Idempotency-Key` header.
fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>> {
    let Some(value) = headers.get(&IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| AppError::BadRequest("Idempotency-Key must be ASCII".to_string()))?
        .trim();

    if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AppError::BadRequest(format!(
            "Idempotency-Key must be 1 to {MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }
    Ok(Some(key.to_owned()))
}

fn visible_to(order: &Order, user: &CurrentUser) -> bool {
    user.is_staff() || order.belongs_to(user.id)
}

/// Check out the stored cart.
///
/// POST /api/orders
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    headers: HeaderMap,
    ApiJson(input): ApiJson<OnlineCheckout>,
) -> Result<ApiResponse<OrderWithItems>> {
    let key = idempotency_key(&headers)?;

    let placed = CheckoutService::new(state.pool(), state.pricing())
        .place_online(user.id, &input, key.as_deref())
        .await?;

    if placed.replayed {
        return Ok(ApiResponse::ok(placed.order));
    }
    Ok(ApiResponse::created(placed.order))
}

/// The signed-in user's orders, newest first.
///
/// GET /api/orders
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<ApiResponse<Vec<Order>>> {
    let page = query.page();
    let orders = OrderRepository::new(state.pool())
        .list_for_customer(user.id, page.limit, page.offset)
        .await?;

    Ok(ApiResponse::ok(orders))
}

/// One order with its items. Other customers' orders are reported missing.
///
/// GET /api/orders/{id}
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<ApiResponse<OrderWithItems>> {
    let order = OrderRepository::new(state.pool())
        .get_with_items(id)
        .await?
        .filter(|o| visible_to(&o.order, &user))
        .ok_or_else(|| AppError::NotFound(format!("Order {id} not found")))?;

    Ok(ApiResponse::ok(order))
}

/// Cancel an order and return its items to stock.
///
/// POST /api/orders/{id}/cancel
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<ApiResponse<OrderWithItems>> {
    let order = CheckoutService::new(state.pool(), state.pricing())
        .cancel(&user, id)
        .await?;

    Ok(ApiResponse::ok(order))
}

/// Move an order through its lifecycle.
///
/// PATCH /api/orders/{id}/status
#[instrument(skip(state, staff), fields(staff_id = %staff.id))]
pub async fn update_status(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(change): ApiJson<StatusChange>,
) -> Result<ApiResponse<OrderWithItems>> {
    let order = CheckoutService::new(state.pool(), state.pricing())
        .transition(&staff, id, change.status)
        .await?;

    Ok(ApiResponse::ok(order))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_idempotency_key_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(idempotency_key(&headers).unwrap(), None);

        headers.insert(&IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static(" checkout-42 "));
        assert_eq!(idempotency_key(&headers).unwrap().as_deref(), Some("checkout-42"));

        headers.insert(&IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static("  "));
        assert!(matches!(idempotency_key(&headers), Err(AppError::BadRequest(_))));

        let long = "k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1);
        headers.insert(&IDEMPOTENCY_KEY_HEADER, HeaderValue::from_str(&long).unwrap());
        assert!(idempotency_key(&headers).is_err());
    }
}
