//! User repository for database operations.
//!
//! Accounts live in `shop.user`; profiles in `shop.customer` or
//! `shop.employee` depending on role. Account and profile are always
//! written in one transaction.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use kitshop_core::{Email, Role, UserId};

use super::{RepositoryError, conflict_on_unique};
use crate::models::user::{
    CustomerProfile, EmployeeProfile, Profile, User, UserFilter, UserUpdate, UserWithProfile,
};

const EMAIL_TAKEN: &str = "email already exists";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: UserId,
    email: Email,
    role: Role,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            role: row.role,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialsRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

/// Both profile tables projected onto one row; at most one side is set.
#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    c_first_name: Option<String>,
    c_last_name: Option<String>,
    c_phone: Option<String>,
    c_address: Option<String>,
    e_first_name: Option<String>,
    e_last_name: Option<String>,
    e_position: Option<String>,
}

impl ProfileRow {
    fn into_profile(self) -> Option<Profile> {
        if let (Some(first_name), Some(last_name)) = (self.c_first_name, self.c_last_name) {
            return Some(Profile::Customer(CustomerProfile {
                first_name,
                last_name,
                phone: self.c_phone,
                address: self.c_address,
            }));
        }
        if let (Some(first_name), Some(last_name)) = (self.e_first_name, self.e_last_name) {
            return Some(Profile::Employee(EmployeeProfile {
                first_name,
                last_name,
                position: self.e_position,
            }));
        }
        None
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserWithProfileRow {
    #[sqlx(flatten)]
    user: UserRow,
    #[sqlx(flatten)]
    profile: ProfileRow,
}

impl From<UserWithProfileRow> for UserWithProfile {
    fn from(row: UserWithProfileRow) -> Self {
        Self {
            user: row.user.into(),
            profile: row.profile.into_profile(),
        }
    }
}

const USER_COLUMNS: &str = "u.id, u.email, u.role, u.active, u.created_at, u.updated_at";

const PROFILE_JOIN: &str = r"
    c.first_name AS c_first_name, c.last_name AS c_last_name,
    c.phone AS c_phone, c.address AS c_address,
    e.first_name AS e_first_name, e.last_name AS e_last_name,
    e.position AS e_position
    FROM shop.user u
    LEFT JOIN shop.customer c ON c.user_id = u.id
    LEFT JOIN shop.employee e ON e.user_id = u.id
";

// =============================================================================
// Repository
// =============================================================================

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM shop.user u WHERE u.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Get a user and their profile by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_with_profile(
        &self,
        id: UserId,
    ) -> Result<Option<UserWithProfile>, RepositoryError> {
        let row = sqlx::query_as::<_, UserWithProfileRow>(&format!(
            "SELECT {USER_COLUMNS}, {PROFILE_JOIN} WHERE u.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Get a user with their password hash, for login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_credentials_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, CredentialsRow>(&format!(
            "SELECT {USER_COLUMNS}, u.password_hash FROM shop.user u WHERE u.email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| (r.user.into(), r.password_hash)))
    }

    /// Create a customer account with its profile.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create_customer(
        &self,
        email: &Email,
        password_hash: &str,
        profile: &CustomerProfile,
    ) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, UserRow>(
            r"
            INSERT INTO shop.user (email, password_hash, role)
            VALUES ($1, $2, 'customer')
            RETURNING id, email, role, active, created_at, updated_at
            ",
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, EMAIL_TAKEN))?;

        sqlx::query(
            r"
            INSERT INTO shop.customer (user_id, first_name, last_name, phone, address)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(user.id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.phone)
        .bind(&profile.address)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(user.into())
    }

    /// Create an employee or admin account with its profile.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create_staff(
        &self,
        email: &Email,
        password_hash: &str,
        role: Role,
        profile: &EmployeeProfile,
    ) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, UserRow>(
            r"
            INSERT INTO shop.user (email, password_hash, role)
            VALUES ($1, $2, $3)
            RETURNING id, email, role, active, created_at, updated_at
            ",
        )
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, EMAIL_TAKEN))?;

        sqlx::query(
            r"
            INSERT INTO shop.employee (user_id, first_name, last_name, position)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(user.id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.position)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(user.into())
    }

    /// List users with their profiles, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, filter: UserFilter) -> Result<Vec<UserWithProfile>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserWithProfileRow>(&format!(
            r"
            SELECT {USER_COLUMNS}, {PROFILE_JOIN}
            WHERE ($1::shop.user_role IS NULL OR u.role = $1)
            ORDER BY u.created_at DESC, u.id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(filter.role)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Change role and/or active flag.
    ///
    /// A role change must stay on the same side of the staff/customer line,
    /// since the profile row is not swapped. Returns `None` if the user does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the new role needs a different
    /// profile kind, `RepositoryError::Database` if the query fails.
    pub async fn update(
        &self,
        id: UserId,
        update: UserUpdate,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            UPDATE shop.user
            SET role = COALESCE($2, role),
                active = COALESCE($3, active),
                updated_at = NOW()
            WHERE id = $1
              AND ($2::shop.user_role IS NULL
                   OR ($2 IN ('admin', 'employee')) = (role IN ('admin', 'employee')))
            RETURNING id, email, role, active, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(update.role)
        .bind(update.active)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.into())),
            None if update.role.is_some() && self.get_by_id(id).await?.is_some() => Err(
                RepositoryError::Conflict("role change needs a different profile".to_string()),
            ),
            None => Ok(None),
        }
    }

    /// Delete a user. Profiles and cart go with it; orders keep a null owner.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.user WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Whether any admin account exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn admin_exists(&self) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM shop.user WHERE role = 'admin')")
                .fetch_one(self.pool)
                .await?;
        Ok(exists)
    }
}

/// Take the account row lock that serializes one user's checkouts.
///
/// `FOR NO KEY UPDATE` leaves foreign-key checks from other writers alone.
/// Returns `false` if the user does not exist.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_for_checkout(conn: &mut PgConnection, id: UserId) -> Result<bool, RepositoryError> {
    let locked: Option<UserId> =
        sqlx::query_scalar("SELECT id FROM shop.user WHERE id = $1 FOR NO KEY UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(locked.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_row_customer() {
        let row = ProfileRow {
            c_first_name: Some("Ada".to_string()),
            c_last_name: Some("Hegerberg".to_string()),
            c_phone: None,
            c_address: Some("Lyon".to_string()),
            e_first_name: None,
            e_last_name: None,
            e_position: None,
        };
        assert!(matches!(
            row.into_profile(),
            Some(Profile::Customer(CustomerProfile { ref first_name, .. })) if first_name == "Ada"
        ));
    }

    #[test]
    fn test_profile_row_employee() {
        let row = ProfileRow {
            c_first_name: None,
            c_last_name: None,
            c_phone: None,
            c_address: None,
            e_first_name: Some("Pep".to_string()),
            e_last_name: Some("Guardiola".to_string()),
            e_position: Some("Cashier".to_string()),
        };
        assert_eq!(
            row.into_profile(),
            Some(Profile::Employee(EmployeeProfile {
                first_name: "Pep".to_string(),
                last_name: "Guardiola".to_string(),
                position: Some("Cashier".to_string()),
            }))
        );
    }

    #[test]
    fn test_profile_row_without_profile() {
        let row = ProfileRow {
            c_first_name: None,
            c_last_name: None,
            c_phone: None,
            c_address: None,
            e_first_name: None,
            e_last_name: None,
            e_position: None,
        };
        assert_eq!(row.into_profile(), None);
    }
}
