use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::carts::error::CartError;
use crate::carts::models::{Cart, CartLineItem, CartOwner, CartStatus, CartTotals, LineAddon};
use crate::models::{Address, Product, ProductVariant};

const CART_COLUMNS: &str = r#"id, user_id, session_token, status, currency,
    ship_country, ship_state, ship_city, ship_postal_code,
    subtotal_minor, discount_minor, tax_minor, shipping_minor, total_minor,
    version, expires_at, created_at, updated_at"#;

/// Repository for catalog reads
///
/// The catalog is owned by an external collaborator; this engine only reads
/// products and variants to snapshot prices and weights.
#[derive(Clone)]
pub struct ProductsRepository {
    pool: PgPool,
}

impl ProductsRepository {
    /// Create a new ProductsRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a product by ID
    pub async fn find_by_id(&self, id: i32) -> Result<Option<Product>, CartError> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, sku, price_minor, currency, weight_grams, is_digital,
                   tax_class, category_id, image_url, track_inventory, backorders_allowed,
                   stock_quantity, reserved_quantity, is_active, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Find a variant by ID, scoped to its product
    pub async fn find_variant(
        &self,
        product_id: i32,
        variant_id: i32,
    ) -> Result<Option<ProductVariant>, CartError> {
        let variant = sqlx::query_as::<_, ProductVariant>(
            r#"
            SELECT id, product_id, name, sku, price_minor, weight_grams, attributes,
                   stock_quantity, reserved_quantity, is_active
            FROM product_variants
            WHERE id = $1 AND product_id = $2
            "#,
        )
        .bind(variant_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(variant)
    }
}

/// Repository for cart rows and their applied coupon codes
#[derive(Clone)]
pub struct CartsRepository {
    pool: PgPool,
}

impl CartsRepository {
    /// Create a new CartsRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a cart for an owner
    pub async fn create(
        &self,
        owner: &CartOwner,
        currency: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Cart, CartError> {
        let cart = sqlx::query_as::<_, Cart>(&format!(
            r#"
            INSERT INTO carts (user_id, session_token, status, currency, expires_at)
            VALUES ($1, $2, 'active', $3, $4)
            RETURNING {CART_COLUMNS}
            "#
        ))
        .bind(owner.user_id())
        .bind(owner.session_token())
        .bind(currency)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(cart)
    }

    /// Find a cart by ID
    pub async fn find_by_id(&self, cart_id: Uuid) -> Result<Option<Cart>, CartError> {
        let cart = sqlx::query_as::<_, Cart>(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE id = $1"
        ))
        .bind(cart_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(cart)
    }

    /// Find a user's active cart, if any
    pub async fn find_active_by_user(&self, user_id: i32) -> Result<Option<Cart>, CartError> {
        let cart = sqlx::query_as::<_, Cart>(&format!(
            r#"
            SELECT {CART_COLUMNS} FROM carts
            WHERE user_id = $1 AND status = 'active'
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(cart)
    }

    /// Find a guest cart by its session token
    pub async fn find_active_by_session(
        &self,
        session_token: &str,
    ) -> Result<Option<Cart>, CartError> {
        let cart = sqlx::query_as::<_, Cart>(&format!(
            r#"
            SELECT {CART_COLUMNS} FROM carts
            WHERE session_token = $1 AND status = 'active'
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(cart)
    }

    /// Set the destination address stub
    pub async fn set_destination(
        &self,
        cart_id: Uuid,
        address: &Address,
    ) -> Result<Cart, CartError> {
        let cart = sqlx::query_as::<_, Cart>(&format!(
            r#"
            UPDATE carts
            SET ship_country = $1, ship_state = $2, ship_city = $3, ship_postal_code = $4,
                updated_at = NOW()
            WHERE id = $5
            RETURNING {CART_COLUMNS}
            "#
        ))
        .bind(&address.country)
        .bind(&address.state)
        .bind(&address.city)
        .bind(&address.postal_code)
        .bind(cart_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CartError::NotFound)?;

        Ok(cart)
    }

    /// Write recomputed totals, guarded by the optimistic version
    ///
    /// # Returns
    /// `Some(cart)` when the expected version still held; `None` when a
    /// concurrent writer got there first and the caller must re-read and
    /// recompute.
    pub async fn update_totals(
        &self,
        cart_id: Uuid,
        totals: &CartTotals,
        expected_version: i32,
    ) -> Result<Option<Cart>, CartError> {
        let cart = sqlx::query_as::<_, Cart>(&format!(
            r#"
            UPDATE carts
            SET subtotal_minor = $1, discount_minor = $2, tax_minor = $3,
                shipping_minor = $4, total_minor = $5,
                version = version + 1, updated_at = NOW()
            WHERE id = $6 AND version = $7
            RETURNING {CART_COLUMNS}
            "#
        ))
        .bind(totals.subtotal.amount_minor())
        .bind(totals.discount.amount_minor())
        .bind(totals.tax.amount_minor())
        .bind(totals.shipping.amount_minor())
        .bind(totals.total.amount_minor())
        .bind(cart_id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        Ok(cart)
    }

    /// Move a cart to a new lifecycle status
    pub async fn set_status(&self, cart_id: Uuid, status: CartStatus) -> Result<(), CartError> {
        sqlx::query("UPDATE carts SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status)
            .bind(cart_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Delete a cart and its dependents (used when a guest cart is merged)
    pub async fn delete(&self, cart_id: Uuid) -> Result<(), CartError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cart_coupons WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    /// Applied coupon codes, in application order
    pub async fn list_coupon_codes(&self, cart_id: Uuid) -> Result<Vec<String>, CartError> {
        let codes = sqlx::query_scalar::<_, String>(
            "SELECT coupon_code FROM cart_coupons WHERE cart_id = $1 ORDER BY applied_at, coupon_code",
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(codes)
    }

    /// Attach a coupon code to the cart
    pub async fn add_coupon_code(&self, cart_id: Uuid, code: &str) -> Result<(), CartError> {
        sqlx::query(
            "INSERT INTO cart_coupons (cart_id, coupon_code, applied_at) VALUES ($1, $2, NOW())",
        )
        .bind(cart_id)
        .bind(code)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Detach a coupon code; returns whether it was attached
    pub async fn remove_coupon_code(&self, cart_id: Uuid, code: &str) -> Result<bool, CartError> {
        let result = sqlx::query(
            "DELETE FROM cart_coupons WHERE cart_id = $1 AND UPPER(coupon_code) = UPPER($2)",
        )
        .bind(cart_id)
        .bind(code)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

const ITEM_COLUMNS: &str = r#"id, cart_id, product_id, variant_id, quantity,
    unit_price_minor, weight_grams, addons, created_at, updated_at"#;

/// Repository for cart line items
#[derive(Clone)]
pub struct CartItemsRepository {
    pool: PgPool,
}

impl CartItemsRepository {
    /// Create a new CartItemsRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All lines of a cart, oldest first
    pub async fn find_by_cart_id(&self, cart_id: Uuid) -> Result<Vec<CartLineItem>, CartError> {
        let items = sqlx::query_as::<_, CartLineItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 ORDER BY id"
        ))
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Find one line by ID within a cart
    pub async fn find_by_id(
        &self,
        cart_id: Uuid,
        item_id: i32,
    ) -> Result<Option<CartLineItem>, CartError> {
        let item = sqlx::query_as::<_, CartLineItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 AND id = $2"
        ))
        .bind(cart_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Find the line for a product+variant pair, the merge key for adds
    pub async fn find_by_product(
        &self,
        cart_id: Uuid,
        product_id: i32,
        variant_id: Option<i32>,
    ) -> Result<Option<CartLineItem>, CartError> {
        let item = sqlx::query_as::<_, CartLineItem>(&format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM cart_items
            WHERE cart_id = $1 AND product_id = $2 AND variant_id IS NOT DISTINCT FROM $3
            "#
        ))
        .bind(cart_id)
        .bind(product_id)
        .bind(variant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Insert a new line with its price and weight snapshot
    pub async fn insert(
        &self,
        cart_id: Uuid,
        product_id: i32,
        variant_id: Option<i32>,
        quantity: i32,
        unit_price_minor: i64,
        weight_grams: i32,
        addons: &[LineAddon],
    ) -> Result<CartLineItem, CartError> {
        let item = sqlx::query_as::<_, CartLineItem>(&format!(
            r#"
            INSERT INTO cart_items
                (cart_id, product_id, variant_id, quantity, unit_price_minor, weight_grams, addons)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(cart_id)
        .bind(product_id)
        .bind(variant_id)
        .bind(quantity)
        .bind(unit_price_minor)
        .bind(weight_grams)
        .bind(sqlx::types::Json(addons))
        .fetch_one(&self.pool)
        .await?;

        Ok(item)
    }

    /// Add to a line's quantity (same product+variant added again)
    pub async fn increment_quantity(&self, item_id: i32, by: i32) -> Result<(), CartError> {
        sqlx::query(
            "UPDATE cart_items SET quantity = quantity + $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(by)
        .bind(item_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Set a line's quantity
    pub async fn set_quantity(&self, item_id: i32, quantity: i32) -> Result<(), CartError> {
        sqlx::query("UPDATE cart_items SET quantity = $1, updated_at = NOW() WHERE id = $2")
            .bind(quantity)
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Refresh a cart-stage line's price/weight snapshot from the catalog
    pub async fn refresh_snapshot(
        &self,
        item_id: i32,
        unit_price_minor: i64,
        weight_grams: i32,
    ) -> Result<(), CartError> {
        sqlx::query(
            r#"
            UPDATE cart_items
            SET unit_price_minor = $1, weight_grams = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(unit_price_minor)
        .bind(weight_grams)
        .bind(item_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a line
    pub async fn delete(&self, item_id: i32) -> Result<(), CartError> {
        sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Repository methods are single statements (or one transaction) against
    // Postgres and are exercised by the integration suite; cart behavior is
    // covered through the service and totals tests.
}
