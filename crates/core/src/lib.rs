//! Kitshop Core - Shared domain types and pricing rules.
//!
//! This crate provides the types and rules used across all Kitshop components:
//! - `api` - Public shop, admin and point-of-sale REST API
//! - `cli` - Command-line tools for migrations, seeding and admin bootstrap
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no database
//! access, no HTTP. Anything that needs to agree between the cart the client
//! sees and the order the server writes lives here.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, money, emails, sizes, roles and statuses
//! - [`pricing`] - Subtotal, shipping, tax and total computation
//! - [`cart`] - Stock-aware cart lines and quantity clamping

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod pricing;
pub mod types;

pub use cart::{
    AdjustmentKind, Availability, Cart, CartAdjustment, CartError, CartLine, QuantityChange,
    RemovalReason,
};
pub use pricing::{PricingError, PricingPolicy, Totals};
pub use types::*;
