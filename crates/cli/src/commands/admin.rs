//! Staff account commands.
//!
//! The API only lets admins create staff, so the first admin has to come
//! from here.
//!
//! # Usage
//!
//! ```bash
//! KITSHOP_ADMIN_PASSWORD='...' kitshop admin create -e owner@kitshop.test -f Ana -l Ruiz
//! kitshop admin create -e till@kitshop.test -f Luis -l Vega -r employee --position Cashier
//! ```
//!
//! # Environment Variables
//!
//! - `KITSHOP_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//! - `KITSHOP_ADMIN_PASSWORD` - Password for the new account

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use kitshop_api::db::{self, RepositoryError, users::UserRepository};
use kitshop_api::models::EmployeeProfile;
use kitshop_api::services::auth::{AuthError, hash_password, validate_password};
use kitshop_core::{Email, Role, UserId};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: KITSHOP_DATABASE_URL (or DATABASE_URL)")]
    MissingDatabaseUrl,

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: admin, employee")]
    InvalidRole(String),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Name or password rejected.
    #[error("{0}")]
    Invalid(String),

    /// User already exists.
    #[error("User already exists with email: {0}")]
    UserExists(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

/// A staff account to create.
pub struct NewStaff {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub position: Option<String>,
    pub password: SecretString,
}

/// Check everything that can be checked without a database.
fn validate(staff: &NewStaff) -> Result<(Email, EmployeeProfile), AdminError> {
    if !staff.role.is_staff() {
        return Err(AdminError::InvalidRole(staff.role.to_string()));
    }
    let email =
        Email::parse(&staff.email).map_err(|_| AdminError::InvalidEmail(staff.email.clone()))?;

    validate_password(staff.password.expose_secret()).map_err(|e| match e {
        AuthError::WeakPassword(msg) => AdminError::Invalid(msg),
        other => AdminError::Invalid(other.to_string()),
    })?;

    let first_name = staff.first_name.trim();
    let last_name = staff.last_name.trim();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(AdminError::Invalid(
            "first and last name are required".to_owned(),
        ));
    }

    let profile = EmployeeProfile {
        first_name: first_name.to_owned(),
        last_name: last_name.to_owned(),
        position: staff
            .position
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned),
    };
    Ok((email, profile))
}

/// Create a staff account.
///
/// # Returns
///
/// The ID of the created user.
///
/// # Errors
///
/// Returns `AdminError` for invalid input, an existing email or a database
/// failure.
pub async fn create_user(staff: NewStaff) -> Result<UserId, AdminError> {
    let (email, profile) = validate(&staff)?;
    let password_hash = hash_password(staff.password.expose_secret())
        .map_err(|e| AdminError::Invalid(e.to_string()))?;

    let database_url = super::database_url().ok_or(AdminError::MissingDatabaseUrl)?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;
    let users = UserRepository::new(&pool);

    if staff.role == Role::Employee && !users.admin_exists().await.map_err(AdminError::Repository)? {
        tracing::warn!("No admin account exists yet; nobody can manage this employee from the API");
    }

    let user = users
        .create_staff(&email, &password_hash, staff.role, &profile)
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => AdminError::UserExists(email.to_string()),
            other => AdminError::Repository(other),
        })?;

    tracing::info!(
        "Account created successfully! ID: {}, Email: {}, Role: {}",
        user.id,
        user.email,
        user.role
    );

    Ok(user.id)
}
