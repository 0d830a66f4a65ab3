use sqlx::PgPool;

use crate::shipping::error::ShippingError;
use crate::shipping::models::{ShippingMethod, ShippingZone};

/// Repository for shipping zone and method records
#[derive(Clone)]
pub struct ShippingRepository {
    pool: PgPool,
}

impl ShippingRepository {
    /// Create a new ShippingRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All active zones, in resolution order
    pub async fn find_active_zones(&self) -> Result<Vec<ShippingZone>, ShippingError> {
        let zones = sqlx::query_as::<_, ShippingZone>(
            r#"
            SELECT id, name, countries, states, postal_patterns, priority, is_default, is_active
            FROM shipping_zones
            WHERE is_active = TRUE
            ORDER BY priority, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(zones)
    }

    /// Active methods serving a zone
    pub async fn find_methods_for_zone(
        &self,
        zone_id: i32,
    ) -> Result<Vec<ShippingMethod>, ShippingError> {
        let methods = sqlx::query_as::<_, ShippingMethod>(
            r#"
            SELECT id, name, zone_ids, strategy, free_shipping_threshold_minor,
                   min_order_minor, max_order_minor, min_weight_grams, max_weight_grams,
                   delivery_min_days, delivery_max_days, is_active
            FROM shipping_methods
            WHERE is_active = TRUE AND $1 = ANY(zone_ids)
            ORDER BY id
            "#,
        )
        .bind(zone_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(methods)
    }

    /// Find one method by id
    pub async fn find_method_by_id(
        &self,
        method_id: i32,
    ) -> Result<Option<ShippingMethod>, ShippingError> {
        let method = sqlx::query_as::<_, ShippingMethod>(
            r#"
            SELECT id, name, zone_ids, strategy, free_shipping_threshold_minor,
                   min_order_minor, max_order_minor, min_weight_grams, max_weight_grams,
                   delivery_min_days, delivery_max_days, is_active
            FROM shipping_methods
            WHERE id = $1
            "#,
        )
        .bind(method_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(method)
    }
}
