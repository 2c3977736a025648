//! Shared identifier and money types for the storefront backend.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{CartId, CartItemId, CheckoutId, OrderId, ProductId, UserId};
