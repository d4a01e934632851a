//! Authentication extractors.
//!
//! Handlers declare the access they need by taking one of:
//!
//! - [`RequireAuth`]: any signed-in, active user
//! - [`RequireStaff`]: employee or admin
//! - [`RequireAdmin`]: admin only
//! - [`OptionalAuth`]: anonymous allowed, a presented token must be valid
//!
//! The bearer token is verified and the account re-read on every request,
//! so deactivation and role changes apply before the token expires.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use tracing::Span;

use crate::error::{AppError, set_sentry_user};
use crate::models::CurrentUser;
use crate::services::auth::{AuthError, AuthService};
use crate::state::AppState;

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn my_orders(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Hello, user {}!", user.id)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Extractor that requires an employee or admin.
pub struct RequireStaff(pub CurrentUser);

/// Extractor that requires an admin.
pub struct RequireAdmin(pub CurrentUser);

/// Extractor for public endpoints that show more to staff.
///
/// No `Authorization` header yields `None`; a bad token is still rejected.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl OptionalAuth {
    /// Whether the caller is signed in as staff.
    #[must_use]
    pub fn is_staff(&self) -> bool {
        self.0.as_ref().is_some_and(CurrentUser::is_staff)
    }
}

/// Error returned when a request lacks the required authentication.
#[derive(Debug)]
pub enum AuthRejection {
    /// No `Authorization: Bearer` header.
    MissingToken,
    /// Token invalid, expired, or its user is gone.
    InvalidToken,
    /// Token valid but the account is deactivated.
    AccountDisabled,
    /// Signed in, but the role is not allowed here.
    Forbidden(&'static str),
    /// Lookup failed on the server side.
    Internal(AppError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let error = match self {
            Self::MissingToken => AppError::Unauthorized("Missing bearer token".to_string()),
            Self::InvalidToken => AppError::Unauthorized("Invalid or expired token".to_string()),
            Self::AccountDisabled => AppError::Unauthorized("Account is deactivated".to_string()),
            Self::Forbidden(msg) => AppError::Forbidden(msg.to_string()),
            Self::Internal(e) => e,
        };
        error.into_response()
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Resolve the current user once per request.
async fn current_user(parts: &mut Parts, state: &AppState) -> Result<CurrentUser, AuthRejection> {
    if let Some(user) = parts.extensions.get::<CurrentUser>() {
        return Ok(user.clone());
    }

    let token = bearer_token(parts).ok_or(AuthRejection::MissingToken)?;

    let user = AuthService::new(state.pool(), state.jwt())
        .authenticate(token)
        .await
        .map_err(|e| match e {
            AuthError::InvalidToken => AuthRejection::InvalidToken,
            AuthError::AccountDisabled => AuthRejection::AccountDisabled,
            other => AuthRejection::Internal(other.into()),
        })?;

    Span::current().record("user_id", user.id.as_i32());
    set_sentry_user(&user.id, user.role.as_str());
    parts.extensions.insert(user.clone());

    Ok(user)
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        current_user(parts, state).await.map(Self)
    }
}

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(Self(None));
        }
        current_user(parts, state).await.map(|user| Self(Some(user)))
    }
}

impl FromRequestParts<AppState> for RequireStaff {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = current_user(parts, state).await?;
        if !user.is_staff() {
            return Err(AuthRejection::Forbidden("Staff access required"));
        }
        Ok(Self(user))
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = current_user(parts, state).await?;
        if !user.is_admin() {
            return Err(AuthRejection::Forbidden("Admin access required"));
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::{Request, StatusCode};

    use super::*;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/cart");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc.def"))), Some("abc.def"));
        assert_eq!(bearer_token(&parts_with(Some("bearer  abc "))), Some("abc"));
        assert_eq!(bearer_token(&parts_with(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts_with(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts_with(None)), None);
    }

    #[test]
    fn test_rejection_status() {
        assert_eq!(
            AuthRejection::MissingToken.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthRejection::AccountDisabled.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthRejection::Forbidden("Admin access required")
                .into_response()
                .status(),
            StatusCode::FORBIDDEN
        );
    }
}
