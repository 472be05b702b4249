//! Payment Gateway Adapter
//!
//! The only component that talks to the external payment provider.
//! Every call carries an idempotency token derived deterministically
//! from the outbox event that triggered it, so a retried outbound call
//! is recognized as a duplicate by the provider itself. This is the
//! second layer of double-spend defense, independent of the local
//! database constraints.

pub mod http;
#[cfg(any(test, feature = "mock-gateway"))]
pub mod mock;

pub use http::HttpPaymentGateway;
#[cfg(any(test, feature = "mock-gateway"))]
pub use mock::MockPaymentGateway;

use async_trait::async_trait;
use thiserror::Error;

/// Provider call outcome classification
///
/// `Transient` is retriable by the outbox worker; `Permanent` is
/// terminal and needs operator resolution; `AlreadyProcessed` means the
/// provider recognized the idempotency token and is treated as success.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Permanent provider error: {0}")]
    Permanent(String),

    #[error("Already processed by provider (ref {0})")]
    AlreadyProcessed(String),
}

impl GatewayError {
    #[inline]
    pub fn is_retriable(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

/// Deterministic idempotency token for one provider call.
///
/// Derived from the outbox event id and the call step, never random
/// per attempt, so every retry of the same event presents the same
/// token.
pub fn idem_token(event_id: i64, step: &str) -> String {
    format!("ob-{}-{}", event_id, step)
}

/// Capability interface over the provider's money-moving primitives.
///
/// All methods MUST be idempotent with respect to `idem_token`: calling
/// twice with the same token must not move money twice.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Adapter name for logging
    fn name(&self) -> &'static str;

    /// Place a hold on the payer's funds. Returns the authorization ref.
    async fn authorize(
        &self,
        amount_cents: i64,
        payer_ref: &str,
        idem_token: &str,
    ) -> Result<String, GatewayError>;

    /// Capture a previously authorized hold. Returns the charge ref.
    async fn capture(&self, provider_ref: &str, idem_token: &str) -> Result<String, GatewayError>;

    /// Pay out to a payee. Returns the transfer ref.
    async fn transfer(
        &self,
        amount_cents: i64,
        payee_ref: &str,
        idem_token: &str,
    ) -> Result<String, GatewayError>;

    /// Return held/captured funds. Returns the refund ref.
    async fn refund(
        &self,
        provider_ref: &str,
        amount_cents: i64,
        idem_token: &str,
    ) -> Result<String, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idem_token_deterministic() {
        assert_eq!(idem_token(17, "authorize"), "ob-17-authorize");
        assert_eq!(idem_token(17, "authorize"), idem_token(17, "authorize"));
        assert_ne!(idem_token(17, "capture"), idem_token(17, "transfer"));
        assert_ne!(idem_token(17, "authorize"), idem_token(18, "authorize"));
    }

    #[test]
    fn test_retriable_classification() {
        assert!(GatewayError::Transient("timeout".into()).is_retriable());
        assert!(!GatewayError::Permanent("card declined".into()).is_retriable());
        assert!(!GatewayError::AlreadyProcessed("auth_1".into()).is_retriable());
    }
}
