use sqlx::PgPool;

use crate::taxes::error::TaxError;
use crate::taxes::models::TaxRate;

/// Repository for tax rate records
#[derive(Clone)]
pub struct TaxRatesRepository {
    pool: PgPool,
}

impl TaxRatesRepository {
    /// Create a new TaxRatesRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find all active tax rates configured for a country
    ///
    /// Geographic, temporal, and filter-option narrowing happens in the
    /// resolver; this query only pre-filters by country and active status.
    pub async fn find_active_for_country(&self, country: &str) -> Result<Vec<TaxRate>, TaxError> {
        let rates = sqlx::query_as::<_, TaxRate>(
            r#"
            SELECT id, name, country, state, city, postal_patterns, rate, tax_class,
                   applies_to_shipping, applies_to_digital, priority, compound,
                   categories_include, categories_exclude,
                   effective_from, effective_until, is_active
            FROM tax_rates
            WHERE is_active = TRUE AND UPPER(country) = UPPER($1)
            ORDER BY priority, id
            "#,
        )
        .bind(country)
        .fetch_all(&self.pool)
        .await?;

        Ok(rates)
    }
}

#[cfg(test)]
mod tests {
    // Repository queries are exercised through the integration suite with a
    // live database; matching and calculation logic is covered by the pure
    // tests in resolver.rs.
}
