//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::PgPool;
use store::{
    CartLine, CartStatus, CommerceStore, MAX_LINE_QUANTITY, Money, NewCheckout, NewOrder,
    NewProduct, OrderPatch, OrderQuery, PostgresStore, ProductPatch, StoreError, User, UserId,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_commerce_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_lines, orders, checkouts, cart_items, carts, products, users CASCADE",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

async fn create_user(store: &PostgresStore) -> User {
    let id = UserId::new();
    store
        .upsert_user(User {
            id,
            email: format!("{id}@example.com"),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            address: "1 Harbor Road".to_string(),
            is_active: true,
            is_superuser: false,
        })
        .await
        .unwrap()
}

fn product(title: &str, cents: i64, quantity: u32) -> NewProduct {
    NewProduct {
        title: title.to_string(),
        description: format!("{title} description"),
        price: Money::from_cents(cents),
        quantity,
        is_visible: true,
        release_date: None,
    }
}

fn new_order(user: &User, cart_id: store::CartId) -> NewOrder {
    NewOrder {
        user_id: user.id,
        cart_id,
        user_name: user.full_name(),
        user_email: user.email.clone(),
        user_address: user.address.clone(),
        paid: true,
    }
}

#[tokio::test]
async fn product_crud_round_trip() {
    let store = get_test_store().await;

    let created = store.insert_product(product("Lamp", 2499, 3)).await.unwrap();
    assert_eq!(created.price, Money::from_cents(2499));

    let updated = store
        .update_product(
            created.id,
            ProductPatch {
                quantity: Some(10),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.quantity, 10);
    assert_eq!(updated.title, "Lamp");

    store.delete_product(created.id).await.unwrap();
    assert!(store.get_product(created.id).await.unwrap().is_none());

    let result = store.delete_product(created.id).await;
    assert!(matches!(result, Err(StoreError::NotFound { .. })));
}

#[tokio::test]
async fn hidden_products_are_not_listed() {
    let store = get_test_store().await;
    store.insert_product(product("Shown", 100, 1)).await.unwrap();
    store
        .insert_product(NewProduct {
            is_visible: false,
            ..product("Hidden", 100, 1)
        })
        .await
        .unwrap();

    let listed = store.list_visible_products(20).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Shown");
}

#[tokio::test]
async fn add_to_cart_decrements_stock() {
    let store = get_test_store().await;
    let user = create_user(&store).await;
    let lamp = store.insert_product(product("Lamp", 2000, 5)).await.unwrap();

    let cart = store
        .add_to_cart(user.id, vec![CartLine::new(lamp.id, 2)])
        .await
        .unwrap();
    assert_eq!(cart.status, CartStatus::Open);
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 2);
    assert_eq!(cart.total_price().unwrap(), Money::from_cents(4000));

    let cart = store
        .add_to_cart(user.id, vec![CartLine::new(lamp.id, 1)])
        .await
        .unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 3);

    let lamp = store.get_product(lamp.id).await.unwrap().unwrap();
    assert_eq!(lamp.quantity, 2);
}

#[tokio::test]
async fn insufficient_stock_rolls_back_every_line() {
    let store = get_test_store().await;
    let user = create_user(&store).await;
    let lamp = store.insert_product(product("Lamp", 2000, 5)).await.unwrap();
    let desk = store.insert_product(product("Desk", 9000, 1)).await.unwrap();

    let result = store
        .add_to_cart(
            user.id,
            vec![CartLine::new(lamp.id, 2), CartLine::new(desk.id, 3)],
        )
        .await;

    match result {
        Err(StoreError::InsufficientStock {
            product_id,
            requested,
            available,
        }) => {
            assert_eq!(product_id, desk.id);
            assert_eq!(requested, 3);
            assert_eq!(available, 1);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    assert_eq!(store.get_product(lamp.id).await.unwrap().unwrap().quantity, 5);
    assert!(store.get_open_cart(user.id).await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_adds_never_oversell() {
    let store = Arc::new(get_test_store().await);
    let lamp = store.insert_product(product("Lamp", 2000, 3)).await.unwrap();

    let mut users = Vec::new();
    for _ in 0..6 {
        users.push(create_user(&store).await);
    }

    let handles: Vec<_> = users
        .iter()
        .map(|user| {
            let store = Arc::clone(&store);
            let user_id = user.id;
            let product_id = lamp.id;
            tokio::spawn(async move {
                store
                    .add_to_cart(user_id, vec![CartLine::new(product_id, 1)])
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(StoreError::InsufficientStock { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(store.get_product(lamp.id).await.unwrap().unwrap().quantity, 0);
}

#[tokio::test]
async fn remove_item_restocks() {
    let store = get_test_store().await;
    let user = create_user(&store).await;
    let lamp = store.insert_product(product("Lamp", 2000, 5)).await.unwrap();

    let cart = store
        .add_to_cart(user.id, vec![CartLine::new(lamp.id, 4)])
        .await
        .unwrap();
    let removed = store.remove_cart_item(cart.items[0].id).await.unwrap();
    assert_eq!(removed.quantity, 4);

    assert_eq!(store.get_product(lamp.id).await.unwrap().unwrap().quantity, 5);
    let cart = store.get_cart(cart.id).await.unwrap().unwrap();
    assert!(cart.is_empty());
}

#[tokio::test]
async fn order_snapshots_lines_and_closes_cart() {
    let store = get_test_store().await;
    let user = create_user(&store).await;
    let lamp = store.insert_product(product("Lamp", 2000, 5)).await.unwrap();

    let cart = store
        .add_to_cart(user.id, vec![CartLine::new(lamp.id, 2)])
        .await
        .unwrap();

    let checkout = store
        .insert_checkout(NewCheckout {
            user_id: user.id,
            cart_id: cart.id,
            amount: cart.total_price().unwrap(),
            email: user.email.clone(),
            name: user.full_name(),
            phone_no: "555-0100".to_string(),
            address: user.address.clone(),
            postal_code: "02139".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(checkout.amount, Money::from_cents(4000));

    let order = store.create_order(new_order(&user, cart.id)).await.unwrap();
    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.total().unwrap(), Money::from_cents(4000));
    assert!(!order.shipped);

    // Later price changes do not touch the order snapshot.
    store
        .update_product(
            lamp.id,
            ProductPatch {
                price: Some(Money::from_cents(9999)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let stored = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.lines[0].unit_price, Money::from_cents(2000));

    let cart = store.get_cart(cart.id).await.unwrap().unwrap();
    assert_eq!(cart.status, CartStatus::Ordered);
    assert!(store.get_open_cart(user.id).await.unwrap().is_none());

    let again = store.create_order(new_order(&user, cart.id)).await;
    assert!(matches!(again, Err(StoreError::CartClosed(_))));

    let remove = store.remove_cart_item(cart.items[0].id).await;
    assert!(matches!(remove, Err(StoreError::CartClosed(_))));
}

#[tokio::test]
async fn empty_cart_cannot_be_ordered_and_stays_open() {
    let store = get_test_store().await;
    let user = create_user(&store).await;
    let lamp = store.insert_product(product("Lamp", 2000, 5)).await.unwrap();

    let cart = store
        .add_to_cart(user.id, vec![CartLine::new(lamp.id, 1)])
        .await
        .unwrap();
    store.remove_cart_item(cart.items[0].id).await.unwrap();

    let result = store.create_order(new_order(&user, cart.id)).await;
    assert!(matches!(result, Err(StoreError::EmptyCart(_))));

    let cart = store.get_cart(cart.id).await.unwrap().unwrap();
    assert_eq!(cart.status, CartStatus::Open);
}

#[tokio::test]
async fn list_and_update_orders() {
    let store = get_test_store().await;
    let alice = create_user(&store).await;
    let bob = create_user(&store).await;
    let lamp = store.insert_product(product("Lamp", 2000, 10)).await.unwrap();

    let mut orders = Vec::new();
    for user in [&alice, &bob] {
        let cart = store
            .add_to_cart(user.id, vec![CartLine::new(lamp.id, 1)])
            .await
            .unwrap();
        orders.push(store.create_order(new_order(user, cart.id)).await.unwrap());
    }

    let all = store.list_orders(OrderQuery::new()).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|o| o.lines.len() == 1));

    let mine = store
        .list_orders(OrderQuery::for_user(alice.id))
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].user_id, alice.id);

    let shipped = store
        .update_order(
            orders[1].id,
            OrderPatch {
                shipped: Some(true),
                paid: None,
            },
        )
        .await
        .unwrap();
    assert!(shipped.shipped);
    assert!(shipped.paid);
    assert_eq!(shipped.lines.len(), 1);

    let unshipped = store
        .list_orders(OrderQuery::unshipped())
        .await
        .unwrap();
    assert_eq!(unshipped.len(), 1);
    assert_eq!(unshipped[0].id, orders[0].id);
}

#[tokio::test]
async fn referenced_product_delete_is_conflict() {
    let store = get_test_store().await;
    let user = create_user(&store).await;
    let lamp = store.insert_product(product("Lamp", 2000, 5)).await.unwrap();
    store
        .add_to_cart(user.id, vec![CartLine::new(lamp.id, 1)])
        .await
        .unwrap();

    let result = store.delete_product(lamp.id).await;
    assert!(matches!(result, Err(StoreError::Conflict(_))));
}

#[tokio::test]
async fn out_of_range_product_fields_are_rejected_before_writing() {
    let store = get_test_store().await;

    let too_many = store
        .insert_product(product("Lamp", 2000, MAX_LINE_QUANTITY + 1))
        .await;
    assert!(matches!(too_many, Err(StoreError::InvalidValue(_))));

    let mut fractional = product("Lamp", 0, 5);
    fractional.price = Money::new(Decimal::new(9999, 3));
    let result = store.insert_product(fractional).await;
    assert!(matches!(result, Err(StoreError::InvalidValue(_))));

    let mut huge = product("Lamp", 0, 5);
    huge.price = Money::new(Decimal::new(10_000_000_000, 0));
    let result = store.insert_product(huge).await;
    assert!(matches!(result, Err(StoreError::InvalidValue(_))));

    let lamp = store.insert_product(product("Lamp", 2000, 5)).await.unwrap();
    let result = store
        .update_product(
            lamp.id,
            ProductPatch {
                quantity: Some(u32::MAX),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(StoreError::InvalidValue(_))));

    let lamp = store.get_product(lamp.id).await.unwrap().unwrap();
    assert_eq!(lamp.quantity, 5);
    assert_eq!(lamp.price, Money::from_cents(2000));
    assert_eq!(store.list_visible_products(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn restock_past_column_range_is_conflict() {
    let store = get_test_store().await;
    let user = create_user(&store).await;
    let lamp = store.insert_product(product("Lamp", 2000, 5)).await.unwrap();
    let cart = store
        .add_to_cart(user.id, vec![CartLine::new(lamp.id, 2)])
        .await
        .unwrap();
    store
        .update_product(
            lamp.id,
            ProductPatch {
                quantity: Some(MAX_LINE_QUANTITY),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = store.remove_cart_item(cart.items[0].id).await;
    assert!(matches!(result, Err(StoreError::Conflict(_))));

    let cart = store.get_cart(cart.id).await.unwrap().unwrap();
    assert_eq!(cart.items.len(), 1);
}
