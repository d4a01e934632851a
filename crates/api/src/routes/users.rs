//! Account administration route handlers (admin only).
//!
//! Admins cannot demote, deactivate or delete their own account, so the
//! shop always keeps at least the admin doing the change.

use axum::extract::State;
use serde::Deserialize;
use tracing::instrument;

use kitshop_core::{Role, UserId};

use crate::db::RepositoryError;
use crate::db::users::UserRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{CurrentUser, User, UserFilter, UserUpdate, UserWithProfile};
use crate::services::auth::{AuthService, StaffAccount};
use crate::state::AppState;

use super::response::{ApiJson, ApiPath, ApiQuery, ApiResponse, Page};

/// `GET /api/users` query string.
#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<Role>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn not_found(id: UserId) -> AppError {
    AppError::NotFound(format!("User {id} not found"))
}

/// Reject changes an admin may not make to their own account.
fn check_self_update(admin: &CurrentUser, id: UserId, update: UserUpdate) -> Result<()> {
    if update.is_empty() {
        return Err(AppError::Validation(
            "Nothing to update: send role and/or active".to_string(),
        ));
    }
    if admin.id != id {
        return Ok(());
    }
    if update.role.is_some_and(|role| role != Role::Admin) {
        return Err(AppError::Conflict("Admins cannot demote themselves".to_string()));
    }
    if update.active == Some(false) {
        return Err(AppError::Conflict(
            "Admins cannot deactivate themselves".to_string(),
        ));
    }
    Ok(())
}

/// List accounts, optionally of one role.
///
/// GET /api/users?role=&limit=&offset=
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> Result<ApiResponse<Vec<UserWithProfile>>> {
    let page = Page::new(query.limit, query.offset);
    let users = UserRepository::new(state.pool())
        .list(UserFilter {
            role: query.role,
            limit: page.limit,
            offset: page.offset,
        })
        .await?;

    Ok(ApiResponse::ok(users))
}

/// Create an employee or admin account.
///
/// POST /api/users
#[instrument(skip_all, fields(admin_id = %admin.id, role = %input.role))]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(input): ApiJson<StaffAccount>,
) -> Result<ApiResponse<User>> {
    let user = AuthService::new(state.pool(), state.jwt())
        .create_staff(input)
        .await?;

    Ok(ApiResponse::created(user))
}

/// One account with its profile.
///
/// GET /api/users/{id}
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
) -> Result<ApiResponse<UserWithProfile>> {
    let user = UserRepository::new(state.pool())
        .get_with_profile(id)
        .await?
        .ok_or_else(|| not_found(id))?;

    Ok(ApiResponse::ok(user))
}

/// Reject a role change that would leave the account with the wrong kind of
/// profile. Customers and staff keep separate profile rows.
fn check_role_change(current: &User, update: UserUpdate) -> Result<()> {
    match update.role {
        Some(next) if !current.role.can_become(next) => Err(AppError::Conflict(format!(
            "Cannot change a {} account to {next}; create a new account instead",
            current.role
        ))),
        _ => Ok(()),
    }
}

/// Change an account's role or active flag.
///
/// PATCH /api/users/{id}
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(update): ApiJson<UserUpdate>,
) -> Result<ApiResponse<User>> {
    check_self_update(&admin, id, update)?;

    let users = UserRepository::new(state.pool());
    let current = users.get_by_id(id).await?.ok_or_else(|| not_found(id))?;
    check_role_change(&current, update)?;

    let user = users.update(id, update).await?.ok_or_else(|| not_found(id))?;

    tracing::info!(user_id = %id, role = %user.role, active = user.active, "account updated");
    Ok(ApiResponse::ok(user))
}

/// Delete an account. Its orders stay, detached from it.
///
/// DELETE /api/users/{id}
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
) -> Result<ApiResponse<serde_json::Value>> {
    if admin.id == id {
        return Err(AppError::Conflict("Admins cannot delete themselves".to_string()));
    }

    UserRepository::new(state.pool())
        .delete(id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => not_found(id),
            other => other.into(),
        })?;

    tracing::info!(user_id = %id, "account deleted");
    Ok(ApiResponse::ok(serde_json::json!({ "id": id, "deleted": true })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use kitshop_core::Email;

    use super::*;

    fn admin() -> CurrentUser {
        CurrentUser {
            id: UserId::new(1),
            role: Role::Admin,
        }
    }

    #[test]
    fn test_admin_cannot_demote_or_deactivate_self() {
        let demote = UserUpdate {
            role: Some(Role::Employee),
            active: None,
        };
        assert!(matches!(
            check_self_update(&admin(), UserId::new(1), demote),
            Err(AppError::Conflict(_))
        ));

        let deactivate = UserUpdate {
            role: None,
            active: Some(false),
        };
        assert!(check_self_update(&admin(), UserId::new(1), deactivate).is_err());
    }

    #[test]
    fn test_admin_can_change_others() {
        let demote = UserUpdate {
            role: Some(Role::Customer),
            active: Some(false),
        };
        assert!(check_self_update(&admin(), UserId::new(2), demote).is_ok());
    }

    fn account(role: Role) -> User {
        User {
            id: UserId::new(5),
            email: Email::parse("fan@kitshop.test").unwrap(),
            role,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_role_change_must_keep_profile_kind() {
        let to_employee = UserUpdate {
            role: Some(Role::Employee),
            active: None,
        };
        assert!(matches!(
            check_role_change(&account(Role::Customer), to_employee),
            Err(AppError::Conflict(_))
        ));
        assert!(check_role_change(&account(Role::Admin), to_employee).is_ok());

        let to_customer = UserUpdate {
            role: Some(Role::Customer),
            active: None,
        };
        assert!(check_role_change(&account(Role::Employee), to_customer).is_err());

        let deactivate = UserUpdate {
            role: None,
            active: Some(false),
        };
        assert!(check_role_change(&account(Role::Customer), deactivate).is_ok());
    }

    #[test]
    fn test_empty_update_rejected() {
        assert!(matches!(
            check_self_update(&admin(), UserId::new(2), UserUpdate::default()),
            Err(AppError::Validation(_))
        ));
    }
}
