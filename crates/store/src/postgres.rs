use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::store::{column_quantity, validate_amount, validate_cart_lines, validate_product_fields};
use crate::{
    Cart, CartId, CartItem, CartItemId, CartLine, CartStatus, Checkout, CheckoutId, CommerceStore,
    Money, NewCheckout, NewOrder, NewProduct, Order, OrderId, OrderLine, OrderPatch, OrderQuery,
    Product, ProductId, ProductPatch, Result, StoreError, User, UserId,
};

const PRODUCT_COLUMNS: &str =
    "id, title, description, price, quantity, is_visible, release_date, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, user_id, user_name, user_email, user_address, paid, shipped, cart_id, created_at, updated_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

/// Maps constraint violations to `Conflict`, everything else to `Database`.
/// SQLSTATE raised when an `INTEGER` column overflows.
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

fn map_db_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(ref db_err)
            if db_err.is_unique_violation()
                || db_err.is_foreign_key_violation()
                || db_err.is_check_violation() =>
        {
            let constraint = db_err.constraint().unwrap_or("unnamed");
            StoreError::Conflict(format!("{} ({constraint})", db_err.message()))
        }
        sqlx::Error::Database(ref db_err)
            if db_err.code().as_deref() == Some(NUMERIC_VALUE_OUT_OF_RANGE) =>
        {
            StoreError::Conflict(db_err.message().to_string())
        }
        e => StoreError::Database(e),
    }
}

fn to_quantity(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::DataCorruption(format!("negative {column}: {value}")))
}

fn row_to_user(row: PgRow) -> Result<User> {
    Ok(User {
        id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        address: row.try_get("address")?,
        is_active: row.try_get("is_active")?,
        is_superuser: row.try_get("is_superuser")?,
    })
}

fn row_to_product(row: PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::new(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        price: Money::new(row.try_get::<Decimal, _>("price")?),
        quantity: to_quantity(row.try_get("quantity")?, "products.quantity")?,
        is_visible: row.try_get("is_visible")?,
        release_date: row.try_get("release_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_cart_item(row: &PgRow) -> Result<CartItem> {
    Ok(CartItem {
        id: CartItemId::new(row.try_get("id")?),
        cart_id: CartId::new(row.try_get("cart_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        product_title: row.try_get("title")?,
        unit_price: Money::new(row.try_get::<Decimal, _>("price")?),
        quantity: to_quantity(row.try_get("quantity")?, "cart_items.quantity")?,
    })
}

fn row_to_checkout(row: PgRow) -> Result<Checkout> {
    Ok(Checkout {
        id: CheckoutId::new(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        cart_id: CartId::new(row.try_get("cart_id")?),
        amount: Money::new(row.try_get::<Decimal, _>("amount")?),
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        phone_no: row.try_get("phone_no")?,
        address: row.try_get("address")?,
        postal_code: row.try_get("postal_code")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_order(row: &PgRow, lines: Vec<OrderLine>) -> Result<Order> {
    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        user_name: row.try_get("user_name")?,
        user_email: row.try_get("user_email")?,
        user_address: row.try_get("user_address")?,
        paid: row.try_get("paid")?,
        shipped: row.try_get("shipped")?,
        cart_id: CartId::new(row.try_get("cart_id")?),
        lines,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn load_cart_items(conn: &mut PgConnection, cart_id: CartId) -> Result<Vec<CartItem>> {
    let rows = sqlx::query(
        r#"
        SELECT ci.id, ci.cart_id, ci.product_id, ci.quantity, p.title, p.price
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.cart_id = $1
        ORDER BY ci.id ASC
        "#,
    )
    .bind(cart_id.as_i64())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_cart_item).collect()
}

async fn load_cart(conn: &mut PgConnection, cart_id: CartId) -> Result<Option<Cart>> {
    let row: Option<PgRow> = sqlx::query(
        "SELECT id, user_id, status, created_at, updated_at FROM carts WHERE id = $1",
    )
    .bind(cart_id.as_i64())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status: String = row.try_get("status")?;
    let status = CartStatus::parse(&status)
        .ok_or_else(|| StoreError::DataCorruption(format!("unknown cart status: {status}")))?;
    let items = load_cart_items(conn, cart_id).await?;

    Ok(Some(Cart {
        id: cart_id,
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        status,
        items,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

async fn load_order_lines(
    conn: &mut PgConnection,
    order_ids: &[i64],
) -> Result<HashMap<i64, Vec<OrderLine>>> {
    let rows = sqlx::query(
        r#"
        SELECT order_id, product_id, product_title, quantity, unit_price
        FROM order_lines
        WHERE order_id = ANY($1)
        ORDER BY order_id ASC, product_id ASC
        "#,
    )
    .bind(order_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut lines: HashMap<i64, Vec<OrderLine>> = HashMap::new();
    for row in rows {
        let order_id: i64 = row.try_get("order_id")?;
        lines.entry(order_id).or_default().push(OrderLine {
            product_id: ProductId::new(row.try_get("product_id")?),
            product_title: row.try_get("product_title")?,
            quantity: to_quantity(row.try_get("quantity")?, "order_lines.quantity")?,
            unit_price: Money::new(row.try_get::<Decimal, _>("unit_price")?),
        });
    }
    Ok(lines)
}

async fn orders_with_lines(conn: &mut PgConnection, rows: Vec<PgRow>) -> Result<Vec<Order>> {
    let ids = rows
        .iter()
        .map(|row| row.try_get::<i64, _>("id"))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut lines = load_order_lines(conn, &ids).await?;

    rows.iter()
        .zip(ids)
        .map(|(row, id)| row_to_order(row, lines.remove(&id).unwrap_or_default()))
        .collect()
}

/// Takes `line.quantity` units from a product in a single guarded statement.
///
/// Returns the quantity left on the product.
async fn decrement_stock(conn: &mut PgConnection, line: &CartLine) -> Result<u32> {
    let remaining: Option<i32> = sqlx::query_scalar(
        r#"
        UPDATE products
        SET quantity = quantity - $2, updated_at = NOW()
        WHERE id = $1 AND quantity >= $2
        RETURNING quantity
        "#,
    )
    .bind(line.product_id.as_i64())
    .bind(column_quantity(line.quantity)?)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(remaining) = remaining {
        return to_quantity(remaining, "products.quantity");
    }

    let available: Option<i32> = sqlx::query_scalar("SELECT quantity FROM products WHERE id = $1")
        .bind(line.product_id.as_i64())
        .fetch_optional(&mut *conn)
        .await?;

    match available {
        None => Err(StoreError::not_found("Product", line.product_id)),
        Some(available) => {
            tracing::debug!(
                product_id = %line.product_id,
                requested = line.quantity,
                available,
                "stock decrement rejected"
            );
            Err(StoreError::InsufficientStock {
                product_id: line.product_id,
                requested: line.quantity,
                available: to_quantity(available, "products.quantity")?,
            })
        }
    }
}

#[async_trait]
impl CommerceStore for PostgresStore {
    async fn upsert_user(&self, user: User) -> Result<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (id, email, first_name, last_name, address, is_active, is_superuser)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                email = EXCLUDED.email,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                address = EXCLUDED.address,
                is_active = EXCLUDED.is_active,
                is_superuser = EXCLUDED.is_superuser
            RETURNING id, email, first_name, last_name, address, is_active, is_superuser
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.address)
        .bind(user.is_active)
        .bind(user.is_superuser)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        row_to_user(row)
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, first_name, last_name, address, is_active, is_superuser
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_user).transpose()
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        validate_product_fields(Some(product.quantity), Some(product.price))?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (title, description, price, quantity, is_visible, release_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price.amount())
        .bind(column_quantity(product.quantity)?)
        .bind(product.is_visible)
        .bind(product.release_date)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        row_to_product(row)
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_product).transpose()
    }

    async fn list_visible_products(&self, limit: usize) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_visible ORDER BY id ASC LIMIT $1"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_product).collect()
    }

    async fn update_product(&self, product_id: ProductId, patch: ProductPatch) -> Result<Product> {
        validate_product_fields(patch.quantity, patch.price)?;
        let quantity = patch.quantity.map(column_quantity).transpose()?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE products SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                quantity = COALESCE($5, quantity),
                is_visible = COALESCE($6, is_visible),
                release_date = COALESCE($7, release_date),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product_id.as_i64())
        .bind(patch.title)
        .bind(patch.description)
        .bind(patch.price.map(|p| p.amount()))
        .bind(quantity)
        .bind(patch.is_visible)
        .bind(patch.release_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        match row {
            Some(row) => row_to_product(row),
            None => Err(StoreError::not_found("Product", product_id)),
        }
    }

    async fn delete_product(&self, product_id: ProductId) -> Result<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(product_id.as_i64())
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Product", product_id));
        }
        Ok(())
    }

    async fn get_open_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        let mut conn = self.pool.acquire().await?;
        let cart_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM carts WHERE user_id = $1 AND status = 'open'")
                .bind(user_id.as_uuid())
                .fetch_optional(&mut *conn)
                .await?;

        match cart_id {
            Some(id) => load_cart(&mut conn, CartId::new(id)).await,
            None => Ok(None),
        }
    }

    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>> {
        let mut conn = self.pool.acquire().await?;
        load_cart(&mut conn, cart_id).await
    }

    async fn get_cart_item(&self, item_id: CartItemId) -> Result<Option<CartItem>> {
        let row = sqlx::query(
            r#"
            SELECT ci.id, ci.cart_id, ci.product_id, ci.quantity, p.title, p.price
            FROM cart_items ci
            JOIN products p ON p.id = ci.product_id
            WHERE ci.id = $1
            "#,
        )
        .bind(item_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_cart_item).transpose()
    }

    async fn add_to_cart(&self, user_id: UserId, lines: Vec<CartLine>) -> Result<Cart> {
        validate_cart_lines(&lines)?;

        let mut tx = self.pool.begin().await?;

        let cart_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO carts (user_id) VALUES ($1)
            ON CONFLICT (user_id) WHERE status = 'open'
            DO UPDATE SET updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;
        let cart_id = CartId::new(cart_id);

        for line in &lines {
            decrement_stock(&mut tx, line).await?;

            sqlx::query(
                r#"
                INSERT INTO cart_items (cart_id, product_id, quantity)
                VALUES ($1, $2, $3)
                ON CONFLICT ON CONSTRAINT unique_cart_product
                DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity
                "#,
            )
            .bind(cart_id.as_i64())
            .bind(line.product_id.as_i64())
            .bind(column_quantity(line.quantity)?)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        }

        let cart = load_cart(&mut tx, cart_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Cart", cart_id))?;

        tx.commit().await?;
        Ok(cart)
    }

    async fn remove_cart_item(&self, item_id: CartItemId) -> Result<CartItem> {
        let mut tx = self.pool.begin().await?;

        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT ci.id, ci.cart_id, ci.product_id, ci.quantity, p.title, p.price, c.status
            FROM cart_items ci
            JOIN carts c ON c.id = ci.cart_id
            JOIN products p ON p.id = ci.product_id
            WHERE ci.id = $1
            FOR UPDATE OF ci, c
            "#,
        )
        .bind(item_id.as_i64())
        .fetch_optional(&mut *tx)
        .await?;

        let row = row.ok_or_else(|| StoreError::not_found("Cart item", item_id))?;
        let item = row_to_cart_item(&row)?;
        let status: String = row.try_get("status")?;
        if CartStatus::parse(&status) != Some(CartStatus::Open) {
            return Err(StoreError::CartClosed(item.cart_id));
        }

        sqlx::query("UPDATE products SET quantity = quantity + $2, updated_at = NOW() WHERE id = $1")
            .bind(item.product_id.as_i64())
            .bind(column_quantity(item.quantity)?)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(item_id.as_i64())
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(item.cart_id.as_i64())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(item)
    }

    async fn insert_checkout(&self, checkout: NewCheckout) -> Result<Checkout> {
        validate_amount("amount", checkout.amount)?;

        let row = sqlx::query(
            r#"
            INSERT INTO checkouts (user_id, cart_id, amount, email, name, phone_no, address, postal_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, user_id, cart_id, amount, email, name, phone_no, address, postal_code, created_at
            "#,
        )
        .bind(checkout.user_id.as_uuid())
        .bind(checkout.cart_id.as_i64())
        .bind(checkout.amount.amount())
        .bind(&checkout.email)
        .bind(&checkout.name)
        .bind(&checkout.phone_no)
        .bind(&checkout.address)
        .bind(&checkout.postal_code)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        row_to_checkout(row)
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        // Closing the cart first serializes concurrent attempts on the same cart.
        let closed: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE carts SET status = 'ordered', updated_at = NOW()
            WHERE id = $1 AND status = 'open'
            RETURNING id
            "#,
        )
        .bind(order.cart_id.as_i64())
        .fetch_optional(&mut *tx)
        .await?;

        if closed.is_none() {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM carts WHERE id = $1")
                .bind(order.cart_id.as_i64())
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => StoreError::CartClosed(order.cart_id),
                None => StoreError::not_found("Cart", order.cart_id),
            });
        }

        let items = load_cart_items(&mut tx, order.cart_id).await?;
        if items.is_empty() {
            return Err(StoreError::EmptyCart(order.cart_id));
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (user_id, user_name, user_email, user_address, paid, shipped, cart_id)
            VALUES ($1, $2, $3, $4, $5, FALSE, $6)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.user_id.as_uuid())
        .bind(&order.user_name)
        .bind(&order.user_email)
        .bind(&order.user_address)
        .bind(order.paid)
        .bind(order.cart_id.as_i64())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;
        let order_id: i64 = row.try_get("id")?;

        let lines: Vec<OrderLine> = items.iter().map(OrderLine::from).collect();
        for line in &lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, product_id, product_title, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order_id)
            .bind(line.product_id.as_i64())
            .bind(&line.product_title)
            .bind(column_quantity(line.quantity)?)
            .bind(line.unit_price.amount())
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        }

        let created = row_to_order(&row, lines)?;
        tx.commit().await?;
        Ok(created)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let row: Option<PgRow> =
            sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(order_id.as_i64())
                .fetch_optional(&mut *conn)
                .await?;

        match row {
            Some(row) => Ok(orders_with_lines(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.user_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND user_id = ${param_count}"));
        }
        if query.shipped.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND shipped = ${param_count}"));
        }

        sql.push_str(" ORDER BY id ASC");

        let mut sqlx_query = sqlx::query(&sql);
        if let Some(user_id) = query.user_id {
            sqlx_query = sqlx_query.bind(user_id.as_uuid());
        }
        if let Some(shipped) = query.shipped {
            sqlx_query = sqlx_query.bind(shipped);
        }

        let mut conn = self.pool.acquire().await?;
        let rows = sqlx_query.fetch_all(&mut *conn).await?;
        orders_with_lines(&mut conn, rows).await
    }

    async fn update_order(&self, order_id: OrderId, patch: OrderPatch) -> Result<Order> {
        let mut conn = self.pool.acquire().await?;
        let row: Option<PgRow> = sqlx::query(&format!(
            r#"
            UPDATE orders SET
                shipped = COALESCE($2, shipped),
                paid = COALESCE($3, paid),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_id.as_i64())
        .bind(patch.shipped)
        .bind(patch.paid)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => orders_with_lines(&mut conn, vec![row])
                .await?
                .pop()
                .ok_or_else(|| StoreError::not_found("Order", order_id)),
            None => Err(StoreError::not_found("Order", order_id)),
        }
    }
}
