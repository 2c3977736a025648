//! Cart operations: show, add, remove and summary.

use common::{CartId, CartItemId, Money, ProductId};
use serde::{Deserialize, Serialize};
use store::{Cart, CartItem, CartLine, CommerceStore, MAX_LINE_QUANTITY, StoreError, User};

use crate::policy::{AccessPolicy, Resource};
use crate::{CommerceError, timed};

/// Totals for a cart, computed from live product prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub cart_id: CartId,
    pub total_quantity: u64,
    pub total_price: Money,
}

impl TryFrom<&Cart> for CartSummary {
    type Error = StoreError;

    fn try_from(cart: &Cart) -> Result<Self, Self::Error> {
        Ok(Self {
            cart_id: cart.id,
            total_quantity: cart.total_quantity(),
            total_price: cart.total_price()?,
        })
    }
}

/// Service for a user's shopping cart.
pub struct CartService<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> CartService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the user's open cart with its items.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn show(&self, user: &User) -> Result<Cart, CommerceError> {
        self.store
            .get_open_cart(user.id)
            .await?
            .ok_or_else(|| CommerceError::NotFound(format!("No active cart for user {}", user.id)))
    }

    /// Adds products to the user's open cart, creating it if needed.
    ///
    /// `product_ids` and `quantities` are parallel sequences. Either every
    /// pair is applied or none is.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn add(
        &self,
        user: &User,
        product_ids: &[ProductId],
        quantities: &[i64],
    ) -> Result<Cart, CommerceError> {
        let lines = pair_lines(product_ids, quantities)?;
        let units: u64 = lines.iter().map(|l| u64::from(l.quantity)).sum();

        match timed("add_to_cart", self.store.add_to_cart(user.id, lines)).await {
            Ok(cart) => {
                metrics::counter!("cart_items_added_total").increment(units);
                tracing::info!(cart_id = %cart.id, units, "items added to cart");
                Ok(cart)
            }
            Err(e) => {
                let err = CommerceError::from(e);
                let reason = match &err {
                    CommerceError::InsufficientStock { .. } => "insufficient_stock",
                    CommerceError::NotFound(_) => "unknown_product",
                    _ => "other",
                };
                metrics::counter!("cart_add_rejected_total", "reason" => reason).increment(1);
                Err(err)
            }
        }
    }

    /// Removes an item from one of the user's carts and restocks its product.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn remove(
        &self,
        user: &User,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<CartItem, CommerceError> {
        let item = self
            .store
            .get_cart_item(item_id)
            .await?
            .ok_or_else(|| CommerceError::not_found("Cart item", item_id))?;
        if item.cart_id != cart_id {
            return Err(CommerceError::Forbidden(format!(
                "item {item_id} is not in cart {cart_id}"
            )));
        }

        let cart = self.owned_cart(user, cart_id).await?;
        if !cart.is_open() {
            return Err(CommerceError::CartClosed(cart_id));
        }

        let removed = timed("remove_cart_item", self.store.remove_cart_item(item_id)).await?;
        tracing::info!(%cart_id, %item_id, quantity = removed.quantity, "item removed from cart");
        Ok(removed)
    }

    /// Totals a cart owned by the user.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn summary(&self, user: &User, cart_id: CartId) -> Result<CartSummary, CommerceError> {
        let cart = self.owned_cart(user, cart_id).await?;
        Ok(CartSummary::try_from(&cart)?)
    }

    async fn owned_cart(&self, user: &User, cart_id: CartId) -> Result<Cart, CommerceError> {
        let cart = self
            .store
            .get_cart(cart_id)
            .await?
            .ok_or_else(|| CommerceError::not_found("Cart", cart_id))?;
        AccessPolicy::authorize(user, Resource::Cart { owner: cart.user_id })?;
        Ok(cart)
    }
}

fn pair_lines(product_ids: &[ProductId], quantities: &[i64]) -> Result<Vec<CartLine>, CommerceError> {
    if product_ids.is_empty() {
        return Err(CommerceError::validation("at least one product is required"));
    }
    if product_ids.len() != quantities.len() {
        return Err(CommerceError::validation(format!(
            "got {} product ids but {} quantities",
            product_ids.len(),
            quantities.len()
        )));
    }

    product_ids
        .iter()
        .zip(quantities)
        .map(|(&product_id, &quantity)| {
            u32::try_from(quantity)
                .ok()
                .filter(|q| (1..=MAX_LINE_QUANTITY).contains(q))
                .map(|q| CartLine::new(product_id, q))
                .ok_or_else(|| {
                    CommerceError::validation(format!(
                        "quantity for product {product_id} must be between 1 and {MAX_LINE_QUANTITY}, got {quantity}"
                    ))
                })
        })
        .collect()
}
