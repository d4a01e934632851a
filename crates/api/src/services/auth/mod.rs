//! Authentication service.
//!
//! Password accounts with Argon2id hashes and JWT bearer tokens.

mod error;
mod token;

pub use error::AuthError;
pub use token::{Claims, IssuedToken, JwtKeys};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::Deserialize;
use sqlx::PgPool;

use kitshop_core::{Email, Role};

use crate::db::RepositoryError;
use crate::db::users::UserRepository;
use crate::models::{CurrentUser, CustomerProfile, EmployeeProfile, User};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Self-service customer registration.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// An employee or admin account created by an admin.
#[derive(Debug, Clone, Deserialize)]
pub struct StaffAccount {
    pub email: String,
    pub password: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub position: Option<String>,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    keys: &'a JwtKeys,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, keys: &'a JwtKeys) -> Self {
        Self {
            users: UserRepository::new(pool),
            keys,
        }
    }

    /// Register a customer and sign them in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::InvalidProfile` if a name is blank.
    /// Returns `AuthError::EmailTaken` if the email is already registered.
    pub async fn register(&self, input: Registration) -> Result<(User, IssuedToken), AuthError> {
        let email = Email::parse(&input.email)?;
        validate_password(&input.password)?;
        let profile = CustomerProfile {
            first_name: required_name(&input.first_name, "first_name")?,
            last_name: required_name(&input.last_name, "last_name")?,
            phone: non_blank(input.phone),
            address: non_blank(input.address),
        };
        let password_hash = hash_password(&input.password)?;

        let user = self
            .users
            .create_customer(&email, &password_hash, &profile)
            .await
            .map_err(taken_or_repository)?;

        tracing::info!(user_id = %user.id, "customer registered");
        let token = self.keys.issue(&user)?;
        Ok((user, token))
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    /// Returns `AuthError::AccountDisabled` if the account is deactivated.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, IssuedToken), AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_credentials_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        if !user.active {
            return Err(AuthError::AccountDisabled);
        }

        let token = self.keys.issue(&user)?;
        Ok((user, token))
    }

    /// Create an employee or admin account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRole` for the customer role.
    /// Returns `AuthError::EmailTaken` if the email is already registered.
    /// Returns the same validation errors as [`Self::register`].
    pub async fn create_staff(&self, input: StaffAccount) -> Result<User, AuthError> {
        if !input.role.is_staff() {
            return Err(AuthError::InvalidRole(input.role));
        }
        let email = Email::parse(&input.email)?;
        validate_password(&input.password)?;
        let profile = EmployeeProfile {
            first_name: required_name(&input.first_name, "first_name")?,
            last_name: required_name(&input.last_name, "last_name")?,
            position: non_blank(input.position),
        };
        let password_hash = hash_password(&input.password)?;

        let user = self
            .users
            .create_staff(&email, &password_hash, input.role, &profile)
            .await
            .map_err(taken_or_repository)?;

        tracing::info!(user_id = %user.id, role = %user.role, "staff account created");
        Ok(user)
    }

    /// Resolve a bearer token to the current user.
    ///
    /// The account is re-read so deactivation and role changes apply
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the token is invalid or the user
    /// no longer exists.
    /// Returns `AuthError::AccountDisabled` if the account is deactivated.
    pub async fn authenticate(&self, token: &str) -> Result<CurrentUser, AuthError> {
        let claims = self.keys.verify(token)?;

        let user = self
            .users
            .get_by_id(claims.user_id())
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !user.active {
            return Err(AuthError::AccountDisabled);
        }

        Ok(CurrentUser {
            id: user.id,
            role: user.role,
        })
    }
}

fn taken_or_repository(e: RepositoryError) -> AuthError {
    match e {
        RepositoryError::Conflict(_) => AuthError::EmailTaken,
        other => AuthError::Repository(other),
    }
}

/// Validate password meets requirements.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` if the password is too short.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

fn required_name(value: &str, field: &str) -> Result<String, AuthError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AuthError::InvalidProfile(format!("{field} is required")));
    }
    Ok(trimmed.to_owned())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_password_length() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("eightchr").is_ok());
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_against_garbage_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-hash"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_required_name_trims() {
        assert_eq!(required_name("  Xavi ", "first_name").unwrap(), "Xavi");
        assert!(matches!(
            required_name("   ", "last_name"),
            Err(AuthError::InvalidProfile(msg)) if msg.contains("last_name")
        ));
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  ".to_string())), None);
        assert_eq!(non_blank(Some(" 555 ".to_string())), Some("555".to_string()));
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn test_conflict_maps_to_email_taken() {
        assert!(matches!(
            taken_or_repository(RepositoryError::Conflict("email".to_string())),
            AuthError::EmailTaken
        ));
        assert!(matches!(
            taken_or_repository(RepositoryError::NotFound),
            AuthError::Repository(RepositoryError::NotFound)
        ));
    }
}
