//! Cart route handlers.
//!
//! Signed-in users have a stored cart. Every read reconciles it against
//! current stock; the response lists what was changed. `quote` prices a cart
//! the client keeps itself, for anonymous browsing.

use axum::extract::State;
use serde::Deserialize;
use tracing::instrument;

use kitshop_core::{CartLine, ProductId, Size};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::{CartUpdate, CartView};
use crate::services::cart::CartService;
use crate::state::AppState;

use super::response::{ApiJson, ApiPath, ApiQuery, ApiResponse};

const fn one() -> u32 {
    1
}

/// A cart line as sent by the client.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LineInput {
    pub product_id: ProductId,
    #[serde(default)]
    pub size: Size,
    #[serde(default = "one")]
    pub quantity: u32,
}

impl From<LineInput> for CartLine {
    fn from(input: LineInput) -> Self {
        Self {
            product_id: input.product_id,
            size: input.size,
            quantity: input.quantity,
        }
    }
}

/// Body of `POST /api/cart/quote`.
#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub items: Vec<LineInput>,
}

/// Body of `PATCH /api/cart/items/{product_id}`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QuantityInput {
    #[serde(default)]
    pub size: Size,
    pub quantity: u32,
}

/// `?size=` selecting one line of a product.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SizeQuery {
    #[serde(default)]
    pub size: Size,
}

/// Price a client-held cart.
///
/// POST /api/cart/quote
#[instrument(skip_all, fields(lines = input.items.len()))]
pub async fn quote(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<QuoteRequest>,
) -> Result<ApiResponse<CartView>> {
    let lines = input.items.into_iter().map(CartLine::from).collect();
    let view = CartService::new(state.pool(), state.pricing())
        .quote(lines)
        .await?;

    Ok(ApiResponse::ok(view))
}

/// The stored cart, reconciled and priced.
///
/// GET /api/cart
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<CartView>> {
    let view = CartService::new(state.pool(), state.pricing())
        .view(user.id)
        .await?;

    Ok(ApiResponse::ok(view))
}

/// Add units to the cart. The response says whether the request was clamped.
///
/// POST /api/cart/items
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn add_item(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(input): ApiJson<LineInput>,
) -> Result<ApiResponse<CartUpdate>> {
    let update = CartService::new(state.pool(), state.pricing())
        .add(user.id, input.product_id, input.size, input.quantity)
        .await?;

    Ok(ApiResponse::ok(update))
}

/// Set a line's quantity, clamped to stock.
///
/// PATCH /api/cart/items/{product_id}
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn update_item(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(product_id): ApiPath<ProductId>,
    ApiJson(input): ApiJson<QuantityInput>,
) -> Result<ApiResponse<CartUpdate>> {
    let update = CartService::new(state.pool(), state.pricing())
        .set_quantity(user.id, product_id, input.size, input.quantity)
        .await?;

    Ok(ApiResponse::ok(update))
}

/// Remove a line.
///
/// DELETE /api/cart/items/{product_id}?size=
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn remove_item(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(product_id): ApiPath<ProductId>,
    ApiQuery(query): ApiQuery<SizeQuery>,
) -> Result<ApiResponse<CartView>> {
    let view = CartService::new(state.pool(), state.pricing())
        .remove(user.id, product_id, query.size)
        .await?;

    Ok(ApiResponse::ok(view))
}

/// Empty the cart.
///
/// DELETE /api/cart
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn clear(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<CartView>> {
    let view = CartService::new(state.pool(), state.pricing())
        .clear(user.id)
        .await?;

    Ok(ApiResponse::ok(view))
}
