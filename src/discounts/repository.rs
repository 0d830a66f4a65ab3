use sqlx::PgPool;

use crate::discounts::error::DiscountError;
use crate::discounts::models::Coupon;

/// Repository for coupon records
#[derive(Clone)]
pub struct CouponsRepository {
    pool: PgPool,
}

impl CouponsRepository {
    /// Create a new CouponsRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a coupon by its code, case-insensitively
    pub async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, DiscountError> {
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            SELECT id, code, discount_type, percentage, amount_minor,
                   min_order_minor, max_discount_minor, status,
                   starts_at, expires_at, usage_limit, times_used
            FROM coupons
            WHERE UPPER(code) = UPPER($1)
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(coupon)
    }

    /// Record one redemption; atomic so concurrent checkouts cannot lose a
    /// count
    pub async fn increment_usage(&self, coupon_id: i32) -> Result<(), DiscountError> {
        sqlx::query("UPDATE coupons SET times_used = times_used + 1 WHERE id = $1")
            .bind(coupon_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Repository queries are exercised through the integration suite with a
    // live database; validation and stacking logic is covered by the pure
    // tests in engine.rs.
}
