//! Order materialization, listing and fulfillment.

use std::sync::Arc;

use common::{CartId, OrderId};
use store::{CommerceStore, NewOrder, Order, OrderPatch, User};

use crate::notification::{Notifier, OrderConfirmation};
use crate::policy::{AccessPolicy, Resource};
use crate::{CommerceError, timed};

/// Service for placing and administering orders.
pub struct OrderService<S: CommerceStore> {
    store: S,
    notifier: Arc<dyn Notifier>,
}

impl<S: CommerceStore> OrderService<S> {
    /// Creates a new order service that reports placed orders to `notifier`.
    pub fn new(store: S, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Turns the user's cart into an order and closes the cart.
    ///
    /// The confirmation is dispatched only after the order is stored; its
    /// outcome never affects the result.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn create(&self, user: &User, cart_id: CartId) -> Result<Order, CommerceError> {
        let cart = self
            .store
            .get_cart(cart_id)
            .await?
            .ok_or_else(|| CommerceError::not_found("Cart", cart_id))?;
        AccessPolicy::authorize(user, Resource::Cart { owner: cart.user_id })?;
        if !cart.is_open() {
            return Err(CommerceError::CartClosed(cart_id));
        }
        if cart.is_empty() {
            return Err(CommerceError::validation(format!(
                "Cart {cart_id} has no items"
            )));
        }
        cart.total_price()?;

        let new_order = NewOrder {
            user_id: user.id,
            cart_id,
            user_name: user.full_name(),
            user_email: user.email.clone(),
            user_address: user.address.clone(),
            paid: true,
        };
        let order = timed("create_order", self.store.create_order(new_order)).await?;
        let total = order.total()?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, %cart_id, %total, "order created");

        self.notifier.order_placed(OrderConfirmation {
            order_id: order.id,
            email: order.user_email.clone(),
            name: order.user_name.clone(),
            total,
        });

        Ok(order)
    }

    /// Lists orders visible to the user.
    ///
    /// Superusers get every order still waiting to ship; everyone else gets
    /// their own orders.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn view(&self, user: &User) -> Result<Vec<Order>, CommerceError> {
        AccessPolicy::authorize(user, Resource::OrderList)?;
        Ok(self
            .store
            .list_orders(AccessPolicy::order_scope(user))
            .await?)
    }

    /// Loads a single order for its owner or a superuser.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn get(&self, user: &User, order_id: OrderId) -> Result<Order, CommerceError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| CommerceError::not_found("Order", order_id))?;
        AccessPolicy::authorize(user, Resource::Order { owner: order.user_id })?;
        Ok(order)
    }

    /// Updates fulfillment flags. Superuser only.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn edit(
        &self,
        order_id: OrderId,
        patch: OrderPatch,
        user: &User,
    ) -> Result<Order, CommerceError> {
        AccessPolicy::authorize(user, Resource::OrderFulfillment)?;

        let order = timed("update_order", self.store.update_order(order_id, patch)).await?;
        tracing::info!(%order_id, shipped = order.shipped, paid = order.paid, "order updated");
        Ok(order)
    }
}
