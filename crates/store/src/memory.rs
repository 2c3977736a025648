use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::store::{add_quantity, validate_amount, validate_cart_lines, validate_product_fields};
use crate::{
    Cart, CartId, CartItem, CartItemId, CartLine, CartStatus, Checkout, CheckoutId, CommerceStore,
    NewCheckout, NewOrder, NewProduct, Order, OrderId, OrderLine, OrderPatch, OrderQuery, Product,
    ProductId, ProductPatch, Result, StoreError, User, UserId,
};

#[derive(Debug, Clone)]
struct CartRow {
    id: CartId,
    user_id: UserId,
    status: CartStatus,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct CartItemRow {
    id: CartItemId,
    cart_id: CartId,
    product_id: ProductId,
    quantity: u32,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    products: BTreeMap<ProductId, Product>,
    carts: BTreeMap<CartId, CartRow>,
    items: BTreeMap<CartItemId, CartItemRow>,
    checkouts: Vec<Checkout>,
    orders: BTreeMap<OrderId, Order>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn open_cart_id(&self, user_id: UserId) -> Option<CartId> {
        self.carts
            .values()
            .find(|c| c.user_id == user_id && c.status == CartStatus::Open)
            .map(|c| c.id)
    }

    fn item_view(&self, row: &CartItemRow) -> Result<CartItem> {
        let product = self.products.get(&row.product_id).ok_or_else(|| {
            StoreError::DataCorruption(format!("dangling product {}", row.product_id))
        })?;
        Ok(CartItem {
            id: row.id,
            cart_id: row.cart_id,
            product_id: row.product_id,
            product_title: product.title.clone(),
            unit_price: product.price,
            quantity: row.quantity,
        })
    }

    fn cart_view(&self, cart_id: CartId) -> Result<Option<Cart>> {
        let Some(row) = self.carts.get(&cart_id) else {
            return Ok(None);
        };
        let items = self
            .items
            .values()
            .filter(|i| i.cart_id == cart_id)
            .map(|i| self.item_view(i))
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Cart {
            id: row.id,
            user_id: row.user_id,
            status: row.status,
            items,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }

    fn is_product_referenced(&self, product_id: ProductId) -> bool {
        self.items.values().any(|i| i.product_id == product_id)
            || self
                .orders
                .values()
                .any(|o| o.lines.iter().any(|l| l.product_id == product_id))
    }
}

/// In-memory store implementation for testing and local runs.
///
/// Each operation holds the write guard for its whole duration, which gives
/// the same all-or-nothing behaviour as the PostgreSQL transactions.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of recorded checkouts.
    pub async fn checkout_count(&self) -> usize {
        self.state.read().await.checkouts.len()
    }

    /// Returns the checkouts recorded for a cart.
    pub async fn checkouts_for_cart(&self, cart_id: CartId) -> Vec<Checkout> {
        self.state
            .read()
            .await
            .checkouts
            .iter()
            .filter(|c| c.cart_id == cart_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CommerceStore for InMemoryStore {
    async fn upsert_user(&self, user: User) -> Result<User> {
        let mut state = self.state.write().await;
        if state
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StoreError::Conflict(format!(
                "email {} is already registered",
                user.email
            )));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        validate_product_fields(Some(product.quantity), Some(product.price))?;

        let mut state = self.state.write().await;
        let now = Utc::now();
        let id = ProductId::new(state.next_id());
        let product = Product {
            id,
            title: product.title,
            description: product.description,
            price: product.price,
            quantity: product.quantity,
            is_visible: product.is_visible,
            release_date: product.release_date,
            created_at: now,
            updated_at: now,
        };
        state.products.insert(id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&product_id).cloned())
    }

    async fn list_visible_products(&self, limit: usize) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        Ok(state
            .products
            .values()
            .filter(|p| p.is_visible)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_product(&self, product_id: ProductId, patch: ProductPatch) -> Result<Product> {
        validate_product_fields(patch.quantity, patch.price)?;

        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or_else(|| StoreError::not_found("Product", product_id))?;
        patch.apply_to(product);
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn delete_product(&self, product_id: ProductId) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.products.contains_key(&product_id) {
            return Err(StoreError::not_found("Product", product_id));
        }
        if state.is_product_referenced(product_id) {
            return Err(StoreError::Conflict(format!(
                "product {product_id} is referenced by carts or orders"
            )));
        }
        state.products.remove(&product_id);
        Ok(())
    }

    async fn get_open_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        let state = self.state.read().await;
        match state.open_cart_id(user_id) {
            Some(cart_id) => state.cart_view(cart_id),
            None => Ok(None),
        }
    }

    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>> {
        self.state.read().await.cart_view(cart_id)
    }

    async fn get_cart_item(&self, item_id: CartItemId) -> Result<Option<CartItem>> {
        let state = self.state.read().await;
        state
            .items
            .get(&item_id)
            .map(|row| state.item_view(row))
            .transpose()
    }

    async fn add_to_cart(&self, user_id: UserId, lines: Vec<CartLine>) -> Result<Cart> {
        validate_cart_lines(&lines)?;

        let mut state = self.state.write().await;

        // Check every line against stock and the line limit before touching anything.
        let open_cart = state.open_cart_id(user_id);
        let mut requested: HashMap<ProductId, u32> = HashMap::new();
        for line in &lines {
            let product = state
                .products
                .get(&line.product_id)
                .ok_or_else(|| StoreError::not_found("Product", line.product_id))?;
            let already = requested.entry(line.product_id).or_insert(0);
            let available = product.quantity - *already;
            if line.quantity > available {
                return Err(StoreError::InsufficientStock {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available,
                });
            }
            *already += line.quantity;

            let in_cart = state
                .items
                .values()
                .find(|i| Some(i.cart_id) == open_cart && i.product_id == line.product_id)
                .map_or(0, |i| i.quantity);
            add_quantity(in_cart, *already, "cart line")?;
        }

        let now = Utc::now();
        let cart_id = match open_cart {
            Some(id) => id,
            None => {
                let id = CartId::new(state.next_id());
                state.carts.insert(
                    id,
                    CartRow {
                        id,
                        user_id,
                        status: CartStatus::Open,
                        created_at: now,
                        updated_at: now,
                    },
                );
                id
            }
        };

        for line in lines {
            if let Some(product) = state.products.get_mut(&line.product_id) {
                product.quantity -= line.quantity;
                product.updated_at = now;
            }

            let existing = state
                .items
                .values()
                .find(|i| i.cart_id == cart_id && i.product_id == line.product_id)
                .map(|i| i.id);
            match existing.and_then(|id| state.items.get_mut(&id)) {
                Some(item) => item.quantity += line.quantity,
                None => {
                    let id = CartItemId::new(state.next_id());
                    state.items.insert(
                        id,
                        CartItemRow {
                            id,
                            cart_id,
                            product_id: line.product_id,
                            quantity: line.quantity,
                        },
                    );
                }
            }
        }

        if let Some(cart) = state.carts.get_mut(&cart_id) {
            cart.updated_at = now;
        }

        state
            .cart_view(cart_id)?
            .ok_or_else(|| StoreError::not_found("Cart", cart_id))
    }

    async fn remove_cart_item(&self, item_id: CartItemId) -> Result<CartItem> {
        let mut state = self.state.write().await;

        let row = *state
            .items
            .get(&item_id)
            .ok_or_else(|| StoreError::not_found("Cart item", item_id))?;
        let cart_open = state
            .carts
            .get(&row.cart_id)
            .is_some_and(|c| c.status == CartStatus::Open);
        if !cart_open {
            return Err(StoreError::CartClosed(row.cart_id));
        }

        let removed = state.item_view(&row)?;
        let now = Utc::now();
        if let Some(product) = state.products.get_mut(&row.product_id) {
            product.quantity = add_quantity(product.quantity, row.quantity, "product")?;
            product.updated_at = now;
        }
        state.items.remove(&item_id);
        if let Some(cart) = state.carts.get_mut(&row.cart_id) {
            cart.updated_at = now;
        }

        Ok(removed)
    }

    async fn insert_checkout(&self, checkout: NewCheckout) -> Result<Checkout> {
        validate_amount("amount", checkout.amount)?;

        let mut state = self.state.write().await;
        if !state.carts.contains_key(&checkout.cart_id) {
            return Err(StoreError::not_found("Cart", checkout.cart_id));
        }
        let id = CheckoutId::new(state.next_id());
        let checkout = Checkout::from_new(id, checkout, Utc::now());
        state.checkouts.push(checkout.clone());
        Ok(checkout)
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        let mut state = self.state.write().await;

        let cart = state
            .cart_view(order.cart_id)?
            .ok_or_else(|| StoreError::not_found("Cart", order.cart_id))?;
        if !cart.is_open() {
            return Err(StoreError::CartClosed(cart.id));
        }
        if cart.is_empty() {
            return Err(StoreError::EmptyCart(cart.id));
        }

        let now = Utc::now();
        let id = OrderId::new(state.next_id());
        let created = Order {
            id,
            user_id: order.user_id,
            user_name: order.user_name,
            user_email: order.user_email,
            user_address: order.user_address,
            paid: order.paid,
            shipped: false,
            cart_id: cart.id,
            lines: cart.items.iter().map(OrderLine::from).collect(),
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(id, created.clone());

        if let Some(row) = state.carts.get_mut(&cart.id) {
            row.status = CartStatus::Ordered;
            row.updated_at = now;
        }

        Ok(created)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|o| query.matches(o.user_id, o.shipped))
            .cloned()
            .collect())
    }

    async fn update_order(&self, order_id: OrderId, patch: OrderPatch) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::not_found("Order", order_id))?;
        patch.apply_to(order);
        order.updated_at = Utc::now();
        Ok(order.clone())
    }
}
