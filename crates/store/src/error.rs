use thiserror::Error;

use crate::{CartId, ProductId};

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A guarded stock decrement found fewer units than requested.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The cart has already been turned into an order and can no longer change.
    #[error("Cart {0} is closed")]
    CartClosed(CartId),

    /// An order was requested for a cart without items.
    #[error("Cart {0} has no items")]
    EmptyCart(CartId),

    /// A cart line failed validation before reaching the database.
    #[error("Invalid cart line: {0}")]
    InvalidLine(String),

    /// A product or checkout field cannot be stored as given.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A constraint rejected the write, or a quantity or total overflowed.
    #[error("Constraint violation: {0}")]
    Conflict(String),

    /// A stored value could not be mapped back into the domain model.
    #[error("Data corruption: {0}")]
    DataCorruption(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
