//! Authentication route handlers.
//!
//! Registration and login return a bearer token; `me` returns the signed-in
//! user with their profile.

use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::users::UserRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{User, UserWithProfile};
use crate::services::auth::{AuthService, IssuedToken, Registration};
use crate::state::AppState;

use super::response::{ApiJson, ApiResponse};

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// A user and the token that signs them in.
#[derive(Debug, Serialize)]
pub struct Session {
    pub user: User,
    #[serde(flatten)]
    pub token: IssuedToken,
}

/// Register a customer account.
///
/// POST /api/auth/register
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<Registration>,
) -> Result<ApiResponse<Session>> {
    let (user, token) = AuthService::new(state.pool(), state.jwt())
        .register(input)
        .await?;

    Ok(ApiResponse::created(Session { user, token }))
}

/// Sign in with email and password.
///
/// POST /api/auth/login
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<LoginRequest>,
) -> Result<ApiResponse<Session>> {
    let (user, token) = AuthService::new(state.pool(), state.jwt())
        .login(&input.email, &input.password)
        .await?;

    tracing::info!(user_id = %user.id, "user signed in");
    Ok(ApiResponse::ok(Session { user, token }))
}

/// The signed-in user and their profile.
///
/// GET /api/auth/me
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn me(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<UserWithProfile>> {
    let found = UserRepository::new(state.pool())
        .get_with_profile(user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(ApiResponse::ok(found))
}
