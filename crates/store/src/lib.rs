pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::{CartId, CartItemId, CheckoutId, Money, OrderId, ProductId, UserId};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use model::{
    Cart, CartItem, CartLine, CartStatus, Checkout, NewCheckout, NewOrder, NewProduct, Order,
    OrderLine, OrderPatch, Product, ProductPatch, User,
};
pub use postgres::PostgresStore;
pub use query::OrderQuery;
pub use store::{CommerceStore, MAX_LINE_QUANTITY, validate_amount, validate_product_fields};
