//! User domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kitshop_core::{Email, Role, UserId};

/// A shop account. The password hash never leaves the repository layer.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile data of a customer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerProfile {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Profile data of an employee or admin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmployeeProfile {
    pub first_name: String,
    pub last_name: String,
    pub position: Option<String>,
}

/// The profile attached to a user, according to role.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Profile {
    Customer(CustomerProfile),
    Employee(EmployeeProfile),
}

/// A user together with their profile.
#[derive(Debug, Clone, Serialize)]
pub struct UserWithProfile {
    #[serde(flatten)]
    pub user: User,
    pub profile: Option<Profile>,
}

/// Admin-side changes to an account. Absent fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct UserUpdate {
    pub role: Option<Role>,
    pub active: Option<bool>,
}

impl UserUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.role.is_none() && self.active.is_none()
    }
}

/// Listing filter for the admin user list.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub limit: i64,
    pub offset: i64,
}
