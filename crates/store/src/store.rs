use async_trait::async_trait;

use crate::{
    Cart, CartId, CartItem, CartItemId, CartLine, Checkout, Money, NewCheckout, NewOrder,
    NewProduct, Order, OrderId, OrderPatch, OrderQuery, Product, ProductId, ProductPatch, Result,
    StoreError, User, UserId,
};

/// Core trait for storefront persistence.
///
/// Every method is one unit of work: operations that touch several rows
/// (adding to a cart, removing a line, materializing an order) commit all
/// of their writes or none of them. All implementations must be thread-safe
/// (Send + Sync).
#[async_trait]
pub trait CommerceStore: Send + Sync {
    /// Inserts or refreshes a user profile.
    async fn upsert_user(&self, user: User) -> Result<User>;

    /// Loads a user profile.
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>>;

    /// Inserts a product and returns it with its assigned id.
    async fn insert_product(&self, product: NewProduct) -> Result<Product>;

    /// Loads a product regardless of visibility.
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Lists visible products ordered by id.
    async fn list_visible_products(&self, limit: usize) -> Result<Vec<Product>>;

    /// Applies a partial update to a product.
    ///
    /// Fails with `NotFound` if the product does not exist.
    async fn update_product(&self, product_id: ProductId, patch: ProductPatch) -> Result<Product>;

    /// Deletes a product.
    ///
    /// Fails with `NotFound` if absent and `Conflict` while carts or orders
    /// still reference it.
    async fn delete_product(&self, product_id: ProductId) -> Result<()>;

    /// Returns the user's open cart, if any.
    async fn get_open_cart(&self, user_id: UserId) -> Result<Option<Cart>>;

    /// Loads a cart by id.
    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>>;

    /// Loads a single cart line.
    async fn get_cart_item(&self, item_id: CartItemId) -> Result<Option<CartItem>>;

    /// Adds lines to the user's open cart, creating the cart if needed.
    ///
    /// For each line the product's quantity is decremented by a guarded
    /// conditional update and the matching cart line is incremented (or
    /// created). Fails with `InsufficientStock` or `NotFound` without any
    /// visible change if a single line cannot be satisfied.
    async fn add_to_cart(&self, user_id: UserId, lines: Vec<CartLine>) -> Result<Cart>;

    /// Deletes a cart line and restocks its product.
    ///
    /// Fails with `NotFound` for an unknown line and `CartClosed` once the
    /// cart has been ordered. Returns the removed line.
    async fn remove_cart_item(&self, item_id: CartItemId) -> Result<CartItem>;

    /// Records a checkout snapshot.
    async fn insert_checkout(&self, checkout: NewCheckout) -> Result<Checkout>;

    /// Materializes the cart into an order and closes the cart.
    ///
    /// Fails with `NotFound`, `CartClosed` or `EmptyCart`; no order is
    /// written and the cart stays open on failure.
    async fn create_order(&self, order: NewOrder) -> Result<Order>;

    /// Loads an order with its lines.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Lists orders matching a query, ordered by id.
    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>>;

    /// Applies a fulfillment flag update.
    ///
    /// Fails with `NotFound` if the order does not exist.
    async fn update_order(&self, order_id: OrderId, patch: OrderPatch) -> Result<Order>;
}

/// Largest per-line quantity the `INTEGER` quantity columns can hold.
pub const MAX_LINE_QUANTITY: u32 = i32::MAX as u32;

/// Validates cart lines before they reach a transaction.
pub fn validate_cart_lines(lines: &[CartLine]) -> Result<()> {
    if lines.is_empty() {
        return Err(StoreError::InvalidLine(
            "at least one line is required".to_string(),
        ));
    }

    for line in lines {
        if line.quantity == 0 {
            return Err(StoreError::InvalidLine(format!(
                "quantity for product {} must be greater than 0",
                line.product_id
            )));
        }
        if line.quantity > MAX_LINE_QUANTITY {
            return Err(StoreError::InvalidLine(format!(
                "quantity for product {} exceeds {MAX_LINE_QUANTITY}",
                line.product_id
            )));
        }
    }

    Ok(())
}

/// Validates a money field against the `NUMERIC(12, 2)` columns.
pub fn validate_amount(field: &str, amount: Money) -> Result<()> {
    if amount.is_negative() {
        return Err(StoreError::InvalidValue(format!(
            "{field} must not be negative"
        )));
    }
    if !amount.fits_amount_column() {
        return Err(StoreError::InvalidValue(format!(
            "{field} must have at most two decimal places and be below 10000000000"
        )));
    }
    Ok(())
}

/// Validates the stock and price of a product about to be written.
pub fn validate_product_fields(quantity: Option<u32>, price: Option<Money>) -> Result<()> {
    if let Some(quantity) = quantity {
        column_quantity(quantity)?;
    }
    if let Some(price) = price {
        validate_amount("price", price)?;
    }
    Ok(())
}

/// Converts a quantity for an `INTEGER` column.
pub(crate) fn column_quantity(quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| {
        StoreError::InvalidValue(format!(
            "quantity {quantity} exceeds {MAX_LINE_QUANTITY}"
        ))
    })
}

/// Adds to a stored quantity, failing once the `INTEGER` column would overflow.
pub(crate) fn add_quantity(current: u32, extra: u32, what: &str) -> Result<u32> {
    current
        .checked_add(extra)
        .filter(|total| *total <= MAX_LINE_QUANTITY)
        .ok_or_else(|| {
            StoreError::Conflict(format!(
                "{what} quantity {current} + {extra} exceeds {MAX_LINE_QUANTITY}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn rejects_empty_lines() {
        assert!(matches!(
            validate_cart_lines(&[]),
            Err(StoreError::InvalidLine(_))
        ));
    }

    #[test]
    fn rejects_zero_quantity() {
        let lines = [CartLine::new(ProductId::new(1), 0)];
        assert!(matches!(
            validate_cart_lines(&lines),
            Err(StoreError::InvalidLine(_))
        ));
    }

    #[test]
    fn rejects_quantity_beyond_column_range() {
        let lines = [CartLine::new(ProductId::new(1), u32::MAX)];
        assert!(validate_cart_lines(&lines).is_err());
    }

    #[test]
    fn product_fields_must_fit_their_columns() {
        assert!(validate_product_fields(Some(MAX_LINE_QUANTITY), Some(Money::from_cents(999))).is_ok());
        assert!(matches!(
            validate_product_fields(Some(MAX_LINE_QUANTITY + 1), None),
            Err(StoreError::InvalidValue(_))
        ));
        assert!(matches!(
            validate_product_fields(None, Some(Money::new(Decimal::new(9999, 3)))),
            Err(StoreError::InvalidValue(_))
        ));
        assert!(matches!(
            validate_product_fields(None, Some(Money::new(Decimal::MAX))),
            Err(StoreError::InvalidValue(_))
        ));
        assert!(matches!(
            validate_amount("amount", Money::from_cents(-1)),
            Err(StoreError::InvalidValue(_))
        ));
    }

    #[test]
    fn quantity_additions_stop_at_column_range() {
        assert_eq!(add_quantity(1, 2, "stock").unwrap(), 3);
        assert!(matches!(
            add_quantity(MAX_LINE_QUANTITY, 1, "stock"),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            add_quantity(u32::MAX, 1, "stock"),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn accepts_positive_quantities() {
        let lines = [
            CartLine::new(ProductId::new(1), 2),
            CartLine::new(ProductId::new(2), 1),
        ];
        assert!(validate_cart_lines(&lines).is_ok());
    }
}
