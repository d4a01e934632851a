//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Password accounts, JWT bearer tokens, staff accounts
//! - `cart` - Stored carts, stock reconciliation and pricing
//! - `checkout` - Online checkout, point of sale and order status changes

pub mod auth;
pub mod cart;
pub mod checkout;
