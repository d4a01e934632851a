//! Product catalog route handlers.
//!
//! Listing and detail are public and show only active products, except to
//! staff who may ask for inactive ones too. Writes are admin-only, stock
//! adjustments and the low-stock report are open to all staff.

use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use kitshop_core::{Money, ProductId};

use crate::db::products::ProductRepository;
use crate::error::{AppError, Result};
use crate::middleware::{OptionalAuth, RequireAdmin, RequireStaff};
use crate::models::{NewProduct, Product, ProductFilter, ProductUpdate};
use crate::state::AppState;

use super::response::{ApiJson, ApiPath, ApiQuery, ApiResponse, Page};

// =============================================================================
// Request Types
// =============================================================================

/// Listing query string.
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Signed stock change, e.g. `{"delta": -2}` after counting shelves.
#[derive(Debug, Deserialize)]
pub struct StockAdjustment {
    pub delta: i32,
}

/// Listing with the window it was cut from.
#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub limit: i64,
    pub offset: i64,
}

// =============================================================================
// Validation
// =============================================================================

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn validate_new_product(mut input: NewProduct) -> Result<NewProduct> {
    input.name = input.name.trim().to_owned();
    input.category = input.category.trim().to_owned();
    if input.name.is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    if input.category.is_empty() {
        return Err(AppError::Validation("category is required".to_string()));
    }
    if input.price <= Money::ZERO {
        return Err(AppError::Validation("price must be positive".to_string()));
    }
    input.description = trimmed(input.description);
    input.image_url = trimmed(input.image_url);
    Ok(input)
}

fn validate_update(mut update: ProductUpdate) -> Result<ProductUpdate> {
    if let Some(name) = &mut update.name {
        *name = name.trim().to_owned();
        if name.is_empty() {
            return Err(AppError::Validation("name cannot be blank".to_string()));
        }
    }
    if let Some(category) = &mut update.category {
        *category = category.trim().to_owned();
        if category.is_empty() {
            return Err(AppError::Validation("category cannot be blank".to_string()));
        }
    }
    if update.price.is_some_and(|p| p <= Money::ZERO) {
        return Err(AppError::Validation("price must be positive".to_string()));
    }
    Ok(update)
}

fn not_found(id: ProductId) -> AppError {
    AppError::NotFound(format!("Product {id} not found"))
}

// =============================================================================
// Handlers
// =============================================================================

/// List products.
///
/// GET /api/products?category=&search=&limit=&offset=
#[instrument(skip_all)]
pub async fn index(
    State(state): State<AppState>,
    auth: OptionalAuth,
    ApiQuery(query): ApiQuery<ProductQuery>,
) -> Result<ApiResponse<ProductPage>> {
    if query.include_inactive && !auth.is_staff() {
        return Err(AppError::Forbidden(
            "Staff access required to list inactive products".to_string(),
        ));
    }

    let page = Page::new(query.limit, query.offset);
    let filter = ProductFilter {
        category: trimmed(query.category),
        search: trimmed(query.search),
        include_inactive: query.include_inactive,
        limit: page.limit,
        offset: page.offset,
    };

    let products = ProductRepository::new(state.pool()).list(&filter).await?;

    Ok(ApiResponse::ok(ProductPage {
        products,
        limit: page.limit,
        offset: page.offset,
    }))
}

/// Distinct categories of active products.
///
/// GET /api/products/categories
pub async fn categories(State(state): State<AppState>) -> Result<ApiResponse<Vec<String>>> {
    let categories = ProductRepository::new(state.pool()).categories().await?;
    Ok(ApiResponse::ok(categories))
}

/// Product detail. Inactive products are hidden from non-staff.
///
/// GET /api/products/{id}
#[instrument(skip(state, auth))]
pub async fn show(
    State(state): State<AppState>,
    auth: OptionalAuth,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<ApiResponse<Product>> {
    let product = ProductRepository::new(state.pool())
        .get(id)
        .await?
        .filter(|p| p.active || auth.is_staff())
        .ok_or_else(|| not_found(id))?;

    Ok(ApiResponse::ok(product))
}

/// Create a product.
///
/// POST /api/products
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(input): ApiJson<NewProduct>,
) -> Result<ApiResponse<Product>> {
    let input = validate_new_product(input)?;
    let product = ProductRepository::new(state.pool()).create(&input).await?;

    tracing::info!(product_id = %product.id, "product created");
    Ok(ApiResponse::created(product))
}

/// Update a product.
///
/// PUT /api/products/{id}
#[instrument(skip(state, admin, update), fields(admin_id = %admin.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(update): ApiJson<ProductUpdate>,
) -> Result<ApiResponse<Product>> {
    let update = validate_update(update)?;
    let product = ProductRepository::new(state.pool())
        .update(id, &update)
        .await?;

    Ok(ApiResponse::ok(product))
}

/// Deactivate a product. Orders keep referring to it.
///
/// DELETE /api/products/{id}
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn deactivate(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<ApiResponse<Product>> {
    let repo = ProductRepository::new(state.pool());
    repo.deactivate(id).await?;
    let product = repo.get(id).await?.ok_or_else(|| not_found(id))?;

    tracing::info!(product_id = %id, "product deactivated");
    Ok(ApiResponse::ok(product))
}

/// Add a signed delta to a product's stock.
///
/// PATCH /api/products/{id}/stock
#[instrument(skip(state, staff, input), fields(staff_id = %staff.id, delta = input.delta))]
pub async fn adjust_stock(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(input): ApiJson<StockAdjustment>,
) -> Result<ApiResponse<Product>> {
    if input.delta == 0 {
        return Err(AppError::Validation("delta must not be zero".to_string()));
    }

    let product = ProductRepository::new(state.pool())
        .adjust_stock(id, input.delta)
        .await?;

    tracing::info!(product_id = %id, stock = product.stock, "stock adjusted");
    Ok(ApiResponse::ok(product))
}

/// Active products at or below their minimum stock.
///
/// GET /api/products/low-stock
#[instrument(skip_all)]
pub async fn low_stock(
    State(state): State<AppState>,
    RequireStaff(_staff): RequireStaff,
) -> Result<ApiResponse<Vec<Product>>> {
    let products = ProductRepository::new(state.pool()).low_stock().await?;
    Ok(ApiResponse::ok(products))
}
