// Validation utilities module
// Provides custom validation functions for domain-specific rules

use validator::ValidationError;

use crate::money::Currency;

/// Validates that a currency code is a well-formed ISO 4217 alpha-3 code
pub fn validate_currency_code(code: &str) -> Result<(), ValidationError> {
    Currency::from_code(code)
        .map(|_| ())
        .map_err(|_| ValidationError::new("invalid_currency_code"))
}

/// Validates that a country code is two ASCII letters (ISO 3166-1 alpha-2)
pub fn validate_country_code(code: &str) -> Result<(), ValidationError> {
    if code.len() == 2 && code.bytes().all(|b| b.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_country_code"))
    }
}

/// Validates a postal-code pattern: alphanumerics, spaces, dashes, and at
/// most one `*` wildcard token
pub fn validate_postal_pattern(pattern: &str) -> Result<(), ValidationError> {
    if pattern.is_empty() || pattern.len() > 16 {
        return Err(ValidationError::new("invalid_postal_pattern"));
    }
    let wildcard_count = pattern.matches('*').count();
    if wildcard_count > 1 {
        return Err(ValidationError::new("invalid_postal_pattern"));
    }
    if pattern
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-' || c == '*')
    {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_postal_pattern"))
    }
}

/// Match a postal-code pattern (at most one `*` wildcard) against a code
///
/// Used by both tax-rate and shipping-zone matching. The pattern is escaped
/// before the wildcard expands, so regex metacharacters in stored patterns
/// stay literal.
pub fn postal_pattern_matches(pattern: &str, postal_code: &str) -> bool {
    let anchored = format!("^{}$", regex::escape(pattern).replace("\\*", ".*"));
    match regex::Regex::new(&anchored) {
        Ok(re) => re.is_match(postal_code),
        // Unreachable after escaping; treat as no match rather than panic
        Err(_) => false,
    }
}
