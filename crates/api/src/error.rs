//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Errors render as
//!
//! ```json
//! { "success": false, "error": { "code": "insufficient_stock", "message": "…" } }
//! ```
//!
//! with a stable machine-readable `code`. Server-side failures are captured to
//! Sentry and their details are never sent to the client.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use kitshop_core::{CartError, MoneyError, PricingError};

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::cart::CartServiceError;
use crate::services::checkout::CheckoutError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Checkout or order status change failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartServiceError),

    /// Request body or parameters failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request conflicts with current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CartError> for AppError {
    fn from(e: CartError) -> Self {
        Self::Cart(CartServiceError::Cart(e))
    }
}

impl From<PricingError> for AppError {
    fn from(e: PricingError) -> Self {
        Self::Cart(CartServiceError::Pricing(e))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => Self::Validation(e.body_text()),
            other => Self::BadRequest(other.body_text()),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

// =============================================================================
// Response rendering
// =============================================================================

/// How an error is presented to the client.
#[derive(Debug)]
struct Rendered {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl Rendered {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "Internal server error",
        )
    }
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    success: bool,
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
}

fn render_repository(err: &RepositoryError) -> Rendered {
    match err {
        RepositoryError::NotFound => Rendered::new(StatusCode::NOT_FOUND, "not_found", "Not found"),
        RepositoryError::Conflict(msg) => Rendered::new(StatusCode::CONFLICT, "conflict", msg),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => Rendered::internal(),
    }
}

fn render_pricing(err: &PricingError) -> Rendered {
    match err {
        PricingError::DiscountExceedsSubtotal { .. } => {
            Rendered::new(StatusCode::BAD_REQUEST, "validation", err.to_string())
        }
        PricingError::Money(MoneyError::Overflow) => Rendered::new(
            StatusCode::BAD_REQUEST,
            "validation",
            "Amount is too large",
        ),
        PricingError::Money(e) => Rendered::new(StatusCode::BAD_REQUEST, "validation", e.to_string()),
        PricingError::InvalidTaxRate(_) => Rendered::internal(),
    }
}

fn render_auth(err: &AuthError) -> Rendered {
    match err {
        AuthError::InvalidEmail(_) => Rendered::new(
            StatusCode::BAD_REQUEST,
            "validation",
            "Invalid email address",
        ),
        AuthError::WeakPassword(msg) | AuthError::InvalidProfile(msg) => {
            Rendered::new(StatusCode::BAD_REQUEST, "validation", msg)
        }
        AuthError::InvalidRole(_) => {
            Rendered::new(StatusCode::BAD_REQUEST, "validation", err.to_string())
        }
        AuthError::InvalidCredentials | AuthError::UserNotFound => Rendered::new(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "Invalid credentials",
        ),
        AuthError::InvalidToken => Rendered::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Invalid or expired token",
        ),
        AuthError::AccountDisabled => Rendered::new(
            StatusCode::FORBIDDEN,
            "forbidden",
            "Account is deactivated",
        ),
        AuthError::EmailTaken => Rendered::new(
            StatusCode::CONFLICT,
            "email_taken",
            "An account with this email already exists",
        ),
        AuthError::Repository(e) => render_repository(e),
        AuthError::TokenSigning(_) | AuthError::PasswordHash => Rendered::internal(),
    }
}

fn render_cart(err: &CartServiceError) -> Rendered {
    match err {
        CartServiceError::Cart(CartError::InvalidQuantity) => {
            Rendered::new(StatusCode::BAD_REQUEST, "validation", err.to_string())
        }
        CartServiceError::Cart(CartError::OutOfStock(product_id)) => Rendered {
            details: Some(serde_json::json!({ "product_id": product_id, "available": 0 })),
            ..Rendered::new(StatusCode::CONFLICT, "insufficient_stock", err.to_string())
        },
        CartServiceError::Cart(CartError::LineNotFound { .. })
        | CartServiceError::ProductNotFound(_) => {
            Rendered::new(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        CartServiceError::Pricing(e) => render_pricing(e),
        CartServiceError::Repository(e) => render_repository(e),
    }
}

fn render_checkout(err: &CheckoutError) -> Rendered {
    match err {
        CheckoutError::EmptyCart => {
            Rendered::new(StatusCode::BAD_REQUEST, "bad_request", "Cart is empty")
        }
        CheckoutError::InvalidOrder(msg) => {
            Rendered::new(StatusCode::BAD_REQUEST, "validation", msg)
        }
        CheckoutError::CustomerNotFound(_) => {
            Rendered::new(StatusCode::BAD_REQUEST, "validation", err.to_string())
        }
        CheckoutError::ProductUnavailable(product_id) => Rendered {
            details: Some(serde_json::json!({ "product_id": product_id })),
            ..Rendered::new(StatusCode::CONFLICT, "conflict", err.to_string())
        },
        CheckoutError::InsufficientStock {
            product_id,
            requested,
            available,
            ..
        } => Rendered {
            details: Some(serde_json::json!({
                "product_id": product_id,
                "requested": requested,
                "available": available,
            })),
            ..Rendered::new(StatusCode::CONFLICT, "insufficient_stock", err.to_string())
        },
        CheckoutError::OrderNotFound(_) => {
            Rendered::new(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        CheckoutError::Forbidden => Rendered::new(
            StatusCode::FORBIDDEN,
            "forbidden",
            "Only pending orders can be cancelled by the customer",
        ),
        CheckoutError::InvalidTransition { .. } => {
            Rendered::new(StatusCode::CONFLICT, "invalid_transition", err.to_string())
        }
        CheckoutError::Pricing(e) => render_pricing(e),
        CheckoutError::Repository(e) => render_repository(e),
    }
}

impl AppError {
    fn render(&self) -> Rendered {
        match self {
            Self::Database(e) => render_repository(e),
            Self::Auth(e) => render_auth(e),
            Self::Checkout(e) => render_checkout(e),
            Self::Cart(e) => render_cart(e),
            Self::Validation(msg) => Rendered::new(StatusCode::BAD_REQUEST, "validation", msg),
            Self::BadRequest(msg) => Rendered::new(StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::NotFound(msg) => Rendered::new(StatusCode::NOT_FOUND, "not_found", msg),
            Self::Unauthorized(msg) => Rendered::new(StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Self::Forbidden(msg) => Rendered::new(StatusCode::FORBIDDEN, "forbidden", msg),
            Self::Conflict(msg) => Rendered::new(StatusCode::CONFLICT, "conflict", msg),
            Self::RateLimited => Rendered::new(
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many requests",
            ),
            Self::Internal(_) => Rendered::internal(),
        }
    }

    /// HTTP status this error renders with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.render().status
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.render().code
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let rendered = self.render();

        // Capture server errors to Sentry
        if rendered.status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, code = rendered.code, "Request rejected");
        }

        let body = ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code: rendered.code,
                message: &rendered.message,
                details: rendered.details.as_ref(),
            },
        };

        (rendered.status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Called once a bearer token resolves, so errors are associated with users.
pub fn set_sentry_user(user_id: &impl ToString, role: &str) {
    sentry::configure_scope(|scope| {
        let mut user = sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        };
        user.other
            .insert("role".to_string(), serde_json::Value::String(role.to_string()));
        scope.set_user(Some(user));
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use kitshop_core::{Money, OrderStatus, ProductId, Size};

    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product 123".to_string());
        assert_eq!(err.to_string(), "Not found: product 123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::NotFound("test".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Unauthorized("test".to_string()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Validation("test".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::Internal("test".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::from(AuthError::EmailTaken).code(),
            "email_taken"
        );
        assert_eq!(
            AppError::from(AuthError::InvalidCredentials).code(),
            "invalid_credentials"
        );
        assert_eq!(
            AppError::from(CheckoutError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Paid,
            })
            .code(),
            "invalid_transition"
        );
        assert_eq!(AppError::from(CheckoutError::EmptyCart).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::from(CartError::LineNotFound {
                product_id: ProductId::new(1),
                size: Size::M,
            })
            .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(PricingError::DiscountExceedsSubtotal {
                discount: Money::from_cents(200),
                subtotal: Money::from_cents(100),
            })
            .code(),
            "validation"
        );
    }

    #[tokio::test]
    async fn test_insufficient_stock_body() {
        let (status, json) = body_json(
            CheckoutError::InsufficientStock {
                product_id: ProductId::new(7),
                name: "Away Jersey".to_string(),
                requested: 3,
                available: 1,
            }
            .into(),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "insufficient_stock");
        assert_eq!(json["error"]["details"]["product_id"], 7);
        assert_eq!(json["error"]["details"]["requested"], 3);
        assert_eq!(json["error"]["details"]["available"], 1);
        assert!(
            json["error"]["message"]
                .as_str()
                .unwrap()
                .contains("Away Jersey")
        );
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let (status, json) = body_json(AppError::Database(RepositoryError::DataCorruption(
            "secret table detail".to_string(),
        )))
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["code"], "internal");
        assert_eq!(json["error"]["message"], "Internal server error");
        assert!(json["error"].get("details").is_none());
    }
}
