//! Domain error types.

use common::{CartId, ProductId};
use store::StoreError;
use thiserror::Error;

/// Errors returned by the storefront services.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// The referenced record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The caller may not act on the resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Not enough units left to satisfy a cart line.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The cart was already turned into an order.
    #[error("Cart {0} has already been ordered")]
    CartClosed(CartId),

    /// The request was malformed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unexpected storage failure. The message is for logs, not clients.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommerceError {
    pub(crate) fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        CommerceError::NotFound(format!("{entity} not found: {id}"))
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        CommerceError::Validation(message.into())
    }
}

impl From<StoreError> for CommerceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => CommerceError::not_found(entity, id),
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => CommerceError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            StoreError::CartClosed(cart_id) => CommerceError::CartClosed(cart_id),
            StoreError::EmptyCart(cart_id) => {
                CommerceError::Validation(format!("Cart {cart_id} has no items"))
            }
            StoreError::InvalidLine(msg) | StoreError::InvalidValue(msg) => {
                CommerceError::Validation(msg)
            }
            StoreError::Conflict(msg) => CommerceError::Conflict(msg),
            e @ (StoreError::DataCorruption(_)
            | StoreError::Database(_)
            | StoreError::Migration(_)) => CommerceError::Internal(e.to_string()),
        }
    }
}
