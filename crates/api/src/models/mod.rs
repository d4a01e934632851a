//! Domain models for the API.
//!
//! Validated domain objects, separate from the database row types in
//! [`crate::db`] and the request bodies in [`crate::routes`].

pub mod cart;
pub mod order;
pub mod product;
pub mod user;

use kitshop_core::{Role, UserId};
use serde::Serialize;

pub use cart::{CartItemView, CartUpdate, CartView};
pub use order::{Order, OrderItem, OrderWithItems, ShippingDetails, StatusCount, StoreSummary};
pub use product::{NewProduct, Product, ProductFilter, ProductUpdate};
pub use user::{
    CustomerProfile, EmployeeProfile, Profile, User, UserFilter, UserUpdate, UserWithProfile,
};

/// The authenticated caller, resolved from a bearer token.
///
/// The role is re-read from the database on every request, so a role change
/// or deactivation takes effect before the token expires.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub role: Role,
}

impl CurrentUser {
    #[must_use]
    pub const fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}
