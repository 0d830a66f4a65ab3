// Inventory adjustments
//
// Every mutation is a single guarded UPDATE, never a read-then-write, so two
// orders fulfilling against the same product cannot lose updates. Methods
// take any executor so callers can run them inside their own transaction and
// keep a whole checkout or order transition all-or-nothing.

use sqlx::PgExecutor;

use crate::inventory::error::InventoryError;

/// Atomic stock operations on products and variants
///
/// Reservation holds stock against an order without decrementing it (carts
/// that never check out must not pin inventory forever). `commit` turns a
/// reservation into a real decrement at payment confirmation; `release` and
/// `restock` undo the two stages on cancel/refund.
#[derive(Debug, Clone, Copy)]
pub struct InventoryRepository;

impl InventoryRepository {
    /// Reserve `quantity` units, failing when the unreserved balance is too
    /// low for a tracked, non-backorderable item
    pub async fn reserve(
        exec: impl PgExecutor<'_>,
        product_id: i32,
        variant_id: Option<i32>,
        quantity: i32,
    ) -> Result<(), InventoryError> {
        let updated: Option<i32> = match variant_id {
            Some(variant) => {
                sqlx::query_scalar(
                    r#"
                    UPDATE product_variants v
                    SET reserved_quantity = v.reserved_quantity + $3
                    FROM products p
                    WHERE v.id = $2 AND v.product_id = $1 AND p.id = v.product_id
                      AND (NOT p.track_inventory OR p.backorders_allowed
                           OR v.stock_quantity - v.reserved_quantity >= $3)
                    RETURNING v.id
                    "#,
                )
                .bind(product_id)
                .bind(variant)
                .bind(quantity)
                .fetch_optional(exec)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    r#"
                    UPDATE products
                    SET reserved_quantity = reserved_quantity + $2, updated_at = NOW()
                    WHERE id = $1
                      AND (NOT track_inventory OR backorders_allowed
                           OR stock_quantity - reserved_quantity >= $2)
                    RETURNING id
                    "#,
                )
                .bind(product_id)
                .bind(quantity)
                .fetch_optional(exec)
                .await?
            }
        };

        match updated {
            Some(_) => Ok(()),
            None => Err(InventoryError::InsufficientStock {
                product_id,
                variant_id,
            }),
        }
    }

    /// Convert a reservation into an actual decrement (payment confirmed)
    pub async fn commit(
        exec: impl PgExecutor<'_>,
        product_id: i32,
        variant_id: Option<i32>,
        quantity: i32,
    ) -> Result<(), InventoryError> {
        let updated: Option<i32> = match variant_id {
            Some(variant) => {
                sqlx::query_scalar(
                    r#"
                    UPDATE product_variants v
                    SET stock_quantity = v.stock_quantity - $3,
                        reserved_quantity = GREATEST(v.reserved_quantity - $3, 0)
                    FROM products p
                    WHERE v.id = $2 AND v.product_id = $1 AND p.id = v.product_id
                      AND (NOT p.track_inventory OR p.backorders_allowed
                           OR v.stock_quantity >= $3)
                    RETURNING v.id
                    "#,
                )
                .bind(product_id)
                .bind(variant)
                .bind(quantity)
                .fetch_optional(exec)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    r#"
                    UPDATE products
                    SET stock_quantity = stock_quantity - $2,
                        reserved_quantity = GREATEST(reserved_quantity - $2, 0),
                        updated_at = NOW()
                    WHERE id = $1
                      AND (NOT track_inventory OR backorders_allowed OR stock_quantity >= $2)
                    RETURNING id
                    "#,
                )
                .bind(product_id)
                .bind(quantity)
                .fetch_optional(exec)
                .await?
            }
        };

        match updated {
            Some(_) => Ok(()),
            None => Err(InventoryError::InsufficientStock {
                product_id,
                variant_id,
            }),
        }
    }

    /// Release a reservation without touching real stock (pre-payment cancel)
    pub async fn release(
        exec: impl PgExecutor<'_>,
        product_id: i32,
        variant_id: Option<i32>,
        quantity: i32,
    ) -> Result<(), InventoryError> {
        match variant_id {
            Some(variant) => {
                sqlx::query(
                    r#"
                    UPDATE product_variants
                    SET reserved_quantity = GREATEST(reserved_quantity - $3, 0)
                    WHERE id = $2 AND product_id = $1
                    "#,
                )
                .bind(product_id)
                .bind(variant)
                .bind(quantity)
                .execute(exec)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE products
                    SET reserved_quantity = GREATEST(reserved_quantity - $2, 0), updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(product_id)
                .bind(quantity)
                .execute(exec)
                .await?;
            }
        }
        Ok(())
    }

    /// Re-increment stock after a cancel/refund of already-decremented units
    pub async fn restock(
        exec: impl PgExecutor<'_>,
        product_id: i32,
        variant_id: Option<i32>,
        quantity: i32,
    ) -> Result<(), InventoryError> {
        match variant_id {
            Some(variant) => {
                sqlx::query(
                    r#"
                    UPDATE product_variants
                    SET stock_quantity = stock_quantity + $3
                    WHERE id = $2 AND product_id = $1
                    "#,
                )
                .bind(product_id)
                .bind(variant)
                .bind(quantity)
                .execute(exec)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE products
                    SET stock_quantity = stock_quantity + $2, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(product_id)
                .bind(quantity)
                .execute(exec)
                .await?;
            }
        }
        Ok(())
    }
}
