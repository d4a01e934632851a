//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                         - Liveness
//! GET    /health/ready                   - Database readiness
//!
//! # Auth (login and register are rate limited per IP)
//! POST   /api/auth/register              - Create customer, returns token
//! POST   /api/auth/login                 - Returns token
//! GET    /api/auth/me                    - Current user and profile
//!
//! # Catalog
//! GET    /api/products                   - List, filter, paginate
//! GET    /api/products/categories        - Distinct categories
//! GET    /api/products/low-stock         - At or below minimum (staff)
//! GET    /api/products/{id}              - Detail
//! POST   /api/products                   - Create (admin)
//! PUT    /api/products/{id}              - Update (admin)
//! DELETE /api/products/{id}              - Deactivate (admin)
//! PATCH  /api/products/{id}/stock        - Adjust stock (staff)
//!
//! # Cart
//! POST   /api/cart/quote                 - Price a client-held cart
//! GET    /api/cart                       - Stored cart
//! DELETE /api/cart                       - Clear
//! POST   /api/cart/items                 - Add item
//! PATCH  /api/cart/items/{product_id}    - Set quantity
//! DELETE /api/cart/items/{product_id}    - Remove line (?size=)
//!
//! # Orders
//! POST   /api/orders                     - Checkout (Idempotency-Key)
//! GET    /api/orders                     - Own orders
//! GET    /api/orders/{id}                - Order and items (owner or staff)
//! POST   /api/orders/{id}/cancel         - Cancel and restock
//! PATCH  /api/orders/{id}/status         - Status transition (staff)
//!
//! # Staff
//! GET    /api/admin/orders               - All orders (?status=)
//! GET    /api/admin/summary              - Dashboard
//! POST   /api/pos/sales                  - In-store sale
//!
//! # Accounts (admin)
//! GET    /api/users                      - List (?role=)
//! POST   /api/users                      - Create staff account
//! GET    /api/users/{id}                 - Detail
//! PATCH  /api/users/{id}                 - Role / active
//! DELETE /api/users/{id}                 - Delete
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod orders;
pub mod pos;
pub mod products;
pub mod response;
pub mod users;

use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{
        HeaderValue, Method, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware::from_fn,
    routing::{get, patch, post},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultOnResponse, OnResponse, TraceLayer},
};
use tracing::Span;

use crate::config::ApiConfig;
use crate::error::AppError;
use crate::middleware::{
    api_rate_limiter, auth_rate_limiter, rate_limit_envelope, request_id::REQUEST_ID_HEADER,
    request_id_middleware, security_headers_middleware,
};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(auth_rate_limiter())
        .layer(from_fn(rate_limit_envelope))
        .route("/me", get(auth::me))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route("/categories", get(products::categories))
        .route("/low-stock", get(products::low_stock))
        .route(
            "/{id}",
            get(products::show)
                .put(products::update)
                .delete(products::deactivate),
        )
        .route("/{id}/stock", patch(products::adjust_stock))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/quote", post(cart::quote))
        .route("/items", post(cart::add_item))
        .route(
            "/items/{product_id}",
            patch(cart::update_item).delete(cart::remove_item),
        )
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index).post(orders::create))
        .route("/{id}", get(orders::show))
        .route("/{id}/cancel", post(orders::cancel))
        .route("/{id}/status", patch(orders::update_status))
}

/// Create the account administration routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(users::index).post(users::create))
        .route(
            "/{id}",
            get(users::show).patch(users::update).delete(users::delete),
        )
}

/// Create all `/api` routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_routes())
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/orders", order_routes())
        .nest("/users", user_routes())
        .route("/admin/orders", get(admin::orders))
        .route("/admin/summary", get(admin::summary))
        .route("/pos/sales", post(pos::create_sale))
        .layer(api_rate_limiter())
        .layer(from_fn(rate_limit_envelope))
}

/// CORS for the configured front-end origins. No origins means none allowed.
fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, orders::IDEMPOTENCY_KEY_HEADER])
        .expose_headers([REQUEST_ID_HEADER])
        .max_age(Duration::from_secs(3600))
}

/// Build the complete application router.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(state.config());

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api", api_routes())
        .fallback(fallback)
        .layer(from_fn(security_headers_middleware))
        .layer(cors)
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        user_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies database connectivity before returning OK.
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn fallback() -> AppError {
    AppError::NotFound("Route not found".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, Response},
    };
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use super::*;

    /// Router over a pool that never connects; only paths that fail before
    /// touching the database are exercised here.
    fn test_app() -> Router {
        let config = ApiConfig::for_tests();
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(100))
            .connect_lazy("postgres://kitshop@127.0.0.1:1/kitshop_test")
            .unwrap();
        app(AppState::new(config, pool))
    }

    fn request(method: Method, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "198.51.100.20")
    }

    async fn json_body(response: Response<Body>) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_app()
            .oneshot(request(Method::GET, "/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn test_unknown_route_uses_envelope() {
        let response = test_app()
            .oneshot(request(Method::GET, "/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn test_cart_requires_token() {
        let response = test_app()
            .oneshot(request(Method::GET, "/api/cart").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"]["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let response = test_app()
            .oneshot(
                request(Method::GET, "/api/admin/summary")
                    .header("authorization", "Bearer not.a.jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let response = test_app()
            .oneshot(
                request(Method::POST, "/api/auth/login")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"email\":"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_quote_rejects_zero_quantity() {
        let response = test_app()
            .oneshot(
                request(Method::POST, "/api/cart/quote")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"items":[{"product_id":1,"size":"M","quantity":0}]}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "validation");
    }

    #[tokio::test]
    async fn test_login_is_rate_limited() {
        let app = test_app();
        let mut last = StatusCode::OK;
        for _ in 0..6 {
            let response = app
                .clone()
                .oneshot(
                    request(Method::POST, "/api/auth/login")
                        .header("content-type", "application/json")
                        .body(Body::from("{}"))
                        .unwrap(),
                )
                .await
                .unwrap();
            last = response.status();
            if last == StatusCode::TOO_MANY_REQUESTS {
                assert_eq!(json_body(response).await["error"]["code"], "rate_limited");
                break;
            }
        }
        assert_eq!(last, StatusCode::TOO_MANY_REQUESTS);
    }
}
