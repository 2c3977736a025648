//! Persistent records for users, the catalog, carts, checkouts and orders.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{CartId, CartItemId, CheckoutId, Money, OrderId, ProductId, Result, StoreError, UserId};

/// Profile of an authenticated user, mirrored from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub is_active: bool,
    pub is_superuser: bool,
}

impl User {
    /// Display name used when denormalizing onto orders.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub description: String,
    pub price: Money,
    /// Units still available to be placed in carts.
    pub quantity: u32,
    pub is_visible: bool,
    pub release_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a product about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub price: Money,
    pub quantity: u32,
    #[serde(default)]
    pub is_visible: bool,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
}

/// Partial update of a product. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub quantity: Option<u32>,
    pub is_visible: Option<bool>,
    pub release_date: Option<NaiveDate>,
}

impl ProductPatch {
    pub(crate) fn apply_to(&self, product: &mut Product) {
        if let Some(title) = &self.title {
            product.title = title.clone();
        }
        if let Some(description) = &self.description {
            product.description = description.clone();
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(quantity) = self.quantity {
            product.quantity = quantity;
        }
        if let Some(is_visible) = self.is_visible {
            product.is_visible = is_visible;
        }
        if let Some(release_date) = self.release_date {
            product.release_date = Some(release_date);
        }
    }
}

/// Lifecycle of a cart.
///
/// ```text
/// Open ──(order created)──► Ordered
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    /// Items may be added and removed.
    #[default]
    Open,

    /// The cart was materialized into an order (terminal).
    Ordered,
}

impl CartStatus {
    /// Returns the value stored in the `carts.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Open => "open",
            CartStatus::Ordered => "ordered",
        }
    }

    /// Parses a `carts.status` column value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(CartStatus::Open),
            "ordered" => Some(CartStatus::Ordered),
            _ => None,
        }
    }
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user's cart together with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub status: CartStatus,
    /// Lines in insertion order.
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Returns true while items can still be changed.
    pub fn is_open(&self) -> bool {
        self.status == CartStatus::Open
    }

    /// Returns true if the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Looks up the line holding a product.
    pub fn item_for_product(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    /// Sum of all line quantities.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Sum of quantity × current unit price over all lines.
    pub fn total_price(&self) -> Result<Money> {
        sum_amounts(self.items.iter().map(CartItem::line_total))
    }
}

/// One product line in a cart.
///
/// `product_title` and `unit_price` are read from the live product row each
/// time the cart is loaded; only `quantity` belongs to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub product_title: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl CartItem {
    /// Returns quantity × unit price.
    pub fn line_total(&self) -> Result<Money> {
        checked_line_total(self.unit_price, self.quantity)
    }
}

/// A requested (product, quantity) pair for an add-to-cart call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CartLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Shipping/contact snapshot about to be recorded for a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCheckout {
    pub user_id: UserId,
    pub cart_id: CartId,
    pub amount: Money,
    pub email: String,
    pub name: String,
    pub phone_no: String,
    pub address: String,
    pub postal_code: String,
}

/// A recorded checkout. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub id: CheckoutId,
    pub user_id: UserId,
    pub cart_id: CartId,
    pub amount: Money,
    pub email: String,
    pub name: String,
    pub phone_no: String,
    pub address: String,
    pub postal_code: String,
    pub created_at: DateTime<Utc>,
}

impl Checkout {
    pub(crate) fn from_new(id: CheckoutId, new: NewCheckout, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: new.user_id,
            cart_id: new.cart_id,
            amount: new.amount,
            email: new.email,
            name: new.name,
            phone_no: new.phone_no,
            address: new.address,
            postal_code: new.postal_code,
            created_at,
        }
    }
}

/// Header of an order about to be materialized from a cart.
///
/// Lines are not supplied by the caller: the store snapshots them from the
/// cart inside the same transaction that closes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub cart_id: CartId,
    pub user_name: String,
    pub user_email: String,
    pub user_address: String,
    pub paid: bool,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub user_name: String,
    pub user_email: String,
    pub user_address: String,
    pub paid: bool,
    pub shipped: bool,
    pub cart_id: CartId,
    pub lines: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Sum of quantity × unit price at the time the order was placed.
    pub fn total(&self) -> Result<Money> {
        sum_amounts(self.lines.iter().map(OrderLine::line_total))
    }
}

/// A purchased product, priced as it was when the order was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub product_title: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    /// Returns quantity × unit price.
    pub fn line_total(&self) -> Result<Money> {
        checked_line_total(self.unit_price, self.quantity)
    }
}

impl From<&CartItem> for OrderLine {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product_id,
            product_title: item.product_title.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
        }
    }
}

/// Fulfillment flag update. Absent fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
    pub shipped: Option<bool>,
    pub paid: Option<bool>,
}

impl OrderPatch {
    pub(crate) fn apply_to(&self, order: &mut Order) {
        if let Some(shipped) = self.shipped {
            order.shipped = shipped;
        }
        if let Some(paid) = self.paid {
            order.paid = paid;
        }
    }
}

fn checked_line_total(unit_price: Money, quantity: u32) -> Result<Money> {
    unit_price.checked_multiply(quantity).ok_or_else(|| {
        StoreError::Conflict(format!("line total {unit_price} x {quantity} overflows"))
    })
}

fn sum_amounts(amounts: impl Iterator<Item = Result<Money>>) -> Result<Money> {
    amounts.fold(Ok(Money::zero()), |total, amount| {
        let (total, amount) = (total?, amount?);
        total
            .checked_add(amount)
            .ok_or_else(|| StoreError::Conflict("total amount overflows".to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, product: i64, quantity: u32, cents: i64) -> CartItem {
        CartItem {
            id: CartItemId::new(id),
            cart_id: CartId::new(1),
            product_id: ProductId::new(product),
            product_title: format!("Product {product}"),
            unit_price: Money::from_cents(cents),
            quantity,
        }
    }

    #[test]
    fn cart_totals_sum_quantity_and_price() {
        let cart = Cart {
            id: CartId::new(1),
            user_id: UserId::new(),
            status: CartStatus::Open,
            items: vec![item(1, 1, 2, 1000), item(2, 2, 1, 250)],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(cart.total_quantity(), 3);
        assert_eq!(cart.total_price().unwrap(), Money::from_cents(2250));
        assert_eq!(
            cart.item_for_product(ProductId::new(2)).map(|i| i.id),
            Some(CartItemId::new(2))
        );
    }

    #[test]
    fn cart_total_overflow_is_an_error() {
        let mut huge = item(1, 1, 2, 0);
        huge.unit_price = Money::new(rust_decimal::Decimal::MAX);
        let cart = Cart {
            id: CartId::new(1),
            user_id: UserId::new(),
            status: CartStatus::Open,
            items: vec![huge],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(matches!(cart.total_price(), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn cart_status_column_values() {
        assert_eq!(CartStatus::parse("open"), Some(CartStatus::Open));
        assert_eq!(CartStatus::parse("ordered"), Some(CartStatus::Ordered));
        assert_eq!(CartStatus::parse("closed"), None);
        assert_eq!(CartStatus::Ordered.to_string(), "ordered");
    }

    #[test]
    fn order_patch_only_touches_present_fields() {
        let mut order = Order {
            id: OrderId::new(1),
            user_id: UserId::new(),
            user_name: "Ada Lovelace".to_string(),
            user_email: "ada@example.com".to_string(),
            user_address: "1 Analytical Way".to_string(),
            paid: true,
            shipped: false,
            cart_id: CartId::new(1),
            lines: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        OrderPatch {
            shipped: Some(true),
            paid: None,
        }
        .apply_to(&mut order);

        assert!(order.shipped);
        assert!(order.paid);
    }

    #[test]
    fn full_name_trims_missing_parts() {
        let user = User {
            id: UserId::new(),
            email: "solo@example.com".to_string(),
            first_name: "Solo".to_string(),
            last_name: String::new(),
            address: String::new(),
            is_active: true,
            is_superuser: false,
        };
        assert_eq!(user.full_name(), "Solo");
    }
}
