// External collaborator seams
//
// The engine never talks to a payment provider or a carrier rate API
// directly; it goes through these traits. Services are generic over them so
// tests can substitute deterministic implementations. Every call site wraps
// the call in `tokio::time::timeout` with the constants below, and a timeout
// leaves the cart or order in its pre-call state.

use std::time::Duration;
use uuid::Uuid;

use crate::models::Address;
use crate::money::Money;

/// Upper bound on a payment gateway round trip
pub const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a carrier rate-quote round trip
pub const QUOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// Error types for payment gateway calls
#[derive(Debug, Clone, thiserror::Error)]
pub enum PaymentError {
    /// The provider processed the request and said no
    #[error("Payment declined: {0}")]
    Declined(String),

    /// The provider could not be reached or answered with a server fault.
    /// Retryable, but only with the same idempotency key.
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Payment gateway call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unknown transaction reference: {0}")]
    UnknownTransaction(String),
}

/// Error types for shipping rate-quote calls
#[derive(Debug, Clone, thiserror::Error)]
pub enum QuoteError {
    /// Provider unreachable or faulted; the caller retries or surfaces the
    /// failure. A price is never synthesized in its place.
    #[error("Rate quote provider unavailable: {0}")]
    Unavailable(String),

    #[error("Rate quote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Destination not serviceable: {0}")]
    NotServiceable(String),
}

/// Abstract payment provider
///
/// `idempotency_key` makes a retried authorize/refund safe: the provider
/// must treat a repeated key as the same logical charge, never a double one.
pub trait PaymentGateway: Send + Sync {
    /// Authorize and capture a charge, returning the provider's transaction
    /// reference
    fn authorize(
        &self,
        amount: Money,
        method: &str,
        idempotency_key: Uuid,
    ) -> impl std::future::Future<Output = Result<String, PaymentError>> + Send;

    /// Refund part or all of a prior charge, returning the refund reference
    fn refund(
        &self,
        transaction_ref: &str,
        amount: Money,
        idempotency_key: Uuid,
    ) -> impl std::future::Future<Output = Result<String, PaymentError>> + Send;
}

/// Abstract carrier rate-quote provider for externally-calculated shipping
pub trait RateQuoteProvider: Send + Sync {
    fn quote(
        &self,
        origin: &Address,
        destination: &Address,
        weight_grams: i64,
    ) -> impl std::future::Future<Output = Result<Money, QuoteError>> + Send;
}

/// Stand-in gateway for deployments without provider credentials
///
/// Every call reports the provider as unavailable, which the lifecycle
/// treats like any other gateway outage: the order is left in its pre-call
/// state. The storefront wires a real client here in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredGateway;

impl PaymentGateway for UnconfiguredGateway {
    async fn authorize(
        &self,
        _amount: Money,
        _method: &str,
        _idempotency_key: Uuid,
    ) -> Result<String, PaymentError> {
        Err(PaymentError::Unavailable(
            "no payment gateway configured".to_string(),
        ))
    }

    async fn refund(
        &self,
        _transaction_ref: &str,
        _amount: Money,
        _idempotency_key: Uuid,
    ) -> Result<String, PaymentError> {
        Err(PaymentError::Unavailable(
            "no payment gateway configured".to_string(),
        ))
    }
}

/// Stand-in rate-quote provider; externally-calculated methods surface a
/// retryable failure instead of a synthesized price
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredQuoteProvider;

impl RateQuoteProvider for UnconfiguredQuoteProvider {
    async fn quote(
        &self,
        _origin: &Address,
        _destination: &Address,
        _weight_grams: i64,
    ) -> Result<Money, QuoteError> {
        Err(QuoteError::Unavailable(
            "no rate-quote provider configured".to_string(),
        ))
    }
}
