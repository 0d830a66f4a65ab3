use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::orders::error::OrderError;
use crate::orders::models::{LineSnapshot, Order, OrderItem, PaymentStatus};

const ORDER_COLUMNS: &str = r#"id, user_id, session_token, cart_id, status, payment_status,
    fulfillment_status, currency, subtotal_minor, discount_minor, tax_minor,
    shipping_minor, total_minor, refunded_amount_minor, transaction_ref,
    carrier, tracking_number, ship_country, ship_state, ship_city, ship_postal_code,
    confirmed_at, shipped_at, delivered_at, cancelled_at, created_at, updated_at"#;

const ITEM_COLUMNS: &str = r#"id, order_id, product_id, variant_id, quantity,
    refunded_quantity, shipped_quantity, unit_price_minor, line_total_minor, snapshot"#;

/// Insert payload for a new order row
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Option<i32>,
    pub session_token: Option<String>,
    pub cart_id: Uuid,
    pub currency: String,
    pub subtotal_minor: i64,
    pub discount_minor: i64,
    pub tax_minor: i64,
    pub shipping_minor: i64,
    pub total_minor: i64,
    pub ship_country: String,
    pub ship_state: Option<String>,
    pub ship_city: Option<String>,
    pub ship_postal_code: Option<String>,
}

/// Insert payload for a new order line with its frozen snapshot
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: i32,
    pub variant_id: Option<i32>,
    pub quantity: i32,
    pub unit_price_minor: i64,
    pub line_total_minor: i64,
    pub snapshot: LineSnapshot,
}

/// Repository for order operations
#[derive(Clone)]
pub struct OrdersRepository {
    pool: PgPool,
}

impl OrdersRepository {
    /// Create a new OrdersRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert an order with its items
    ///
    /// Runs on the caller's connection so checkout can make order creation,
    /// stock reservation, and the cart status flip one transaction.
    pub async fn create(
        &self,
        conn: &mut PgConnection,
        new_order: NewOrder,
        items: &[NewOrderItem],
    ) -> Result<Order, OrderError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            INSERT INTO orders
                (user_id, session_token, cart_id, status, payment_status, fulfillment_status,
                 currency, subtotal_minor, discount_minor, tax_minor, shipping_minor,
                 total_minor, ship_country, ship_state, ship_city, ship_postal_code)
            VALUES ($1, $2, $3, 'pending', 'pending', 'unfulfilled',
                    $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(new_order.user_id)
        .bind(&new_order.session_token)
        .bind(new_order.cart_id)
        .bind(&new_order.currency)
        .bind(new_order.subtotal_minor)
        .bind(new_order.discount_minor)
        .bind(new_order.tax_minor)
        .bind(new_order.shipping_minor)
        .bind(new_order.total_minor)
        .bind(&new_order.ship_country)
        .bind(&new_order.ship_state)
        .bind(&new_order.ship_city)
        .bind(&new_order.ship_postal_code)
        .fetch_one(&mut *conn)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items
                    (order_id, product_id, variant_id, quantity, unit_price_minor,
                     line_total_minor, snapshot)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order.id)
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(item.quantity)
            .bind(item.unit_price_minor)
            .bind(item.line_total_minor)
            .bind(sqlx::types::Json(&item.snapshot))
            .execute(&mut *conn)
            .await?;
        }

        Ok(order)
    }

    /// Flip the source cart to checked-out inside the checkout transaction
    pub async fn mark_cart_checked_out(
        &self,
        conn: &mut PgConnection,
        cart_id: Uuid,
    ) -> Result<(), OrderError> {
        sqlx::query("UPDATE carts SET status = 'checked_out', updated_at = NOW() WHERE id = $1")
            .bind(cart_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Find an order by ID
    pub async fn find_by_id(&self, order_id: Uuid) -> Result<Option<Order>, OrderError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Find all items for a given order
    pub async fn find_items_by_order_id(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<OrderItem>, OrderError> {
        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Persist a transition's outcome: status axes, payment fields,
    /// tracking, and lifecycle timestamps, in one statement
    pub async fn save_transition(
        &self,
        conn: &mut PgConnection,
        order: &Order,
    ) -> Result<Order, OrderError> {
        let saved = sqlx::query_as::<_, Order>(&format!(
            r#"
            UPDATE orders
            SET status = $1, payment_status = $2, fulfillment_status = $3,
                refunded_amount_minor = $4, transaction_ref = $5,
                carrier = $6, tracking_number = $7,
                confirmed_at = $8, shipped_at = $9, delivered_at = $10, cancelled_at = $11,
                updated_at = NOW()
            WHERE id = $12
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.fulfillment_status)
        .bind(order.refunded_amount_minor)
        .bind(&order.transaction_ref)
        .bind(&order.carrier)
        .bind(&order.tracking_number)
        .bind(order.confirmed_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .bind(order.id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(OrderError::NotFound)?;

        Ok(saved)
    }

    /// Record a failed payment attempt without touching the status axis
    pub async fn set_payment_status(
        &self,
        order_id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<(), OrderError> {
        sqlx::query("UPDATE orders SET payment_status = $1, updated_at = NOW() WHERE id = $2")
            .bind(payment_status)
            .bind(order_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Update a line's refunded/shipped counters
    pub async fn update_item_quantities(
        &self,
        conn: &mut PgConnection,
        item_id: i32,
        refunded_quantity: i32,
        shipped_quantity: i32,
    ) -> Result<(), OrderError> {
        sqlx::query(
            r#"
            UPDATE order_items
            SET refunded_quantity = $1, shipped_quantity = $2
            WHERE id = $3
            "#,
        )
        .bind(refunded_quantity)
        .bind(shipped_quantity)
        .bind(item_id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
