//! Mock Payment Gateway
//!
//! In-process fake provider for tests and local development. Records
//! every idempotency token it has processed so duplicate calls surface
//! as `AlreadyProcessed`, exactly like the real provider. Failures can
//! be scripted per-instance.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{GatewayError, PaymentGateway};

#[derive(Default)]
pub struct MockPaymentGateway {
    /// token -> provider ref of the call that actually executed
    processed: Mutex<HashMap<String, String>>,
    /// Number of upcoming calls to fail with a transient error
    transient_failures: AtomicUsize,
    /// All further calls fail permanently (e.g. card declined)
    fail_permanent: AtomicBool,
    /// Calls that reached the provider (including rejected ones)
    call_count: AtomicUsize,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls with a transient error
    pub fn set_transient_failures(&self, n: usize) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_permanent(&self, fail: bool) {
        self.fail_permanent.store(fail, Ordering::SeqCst);
    }

    /// Total calls that reached the provider (success or failure)
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Distinct money-moving effects executed (one per unique token)
    pub fn effect_count(&self) -> usize {
        self.processed.lock().unwrap().len()
    }

    /// Whether a given idempotency token executed an effect
    pub fn has_processed(&self, token: &str) -> bool {
        self.processed.lock().unwrap().contains_key(token)
    }

    fn execute(&self, op: &str, token: &str) -> Result<String, GatewayError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if self.fail_permanent.load(Ordering::SeqCst) {
            return Err(GatewayError::Permanent("card declined".to_string()));
        }

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(GatewayError::Transient("simulated timeout".to_string()));
        }

        let mut processed = self.processed.lock().unwrap();
        if let Some(existing) = processed.get(token) {
            return Err(GatewayError::AlreadyProcessed(existing.clone()));
        }

        let provider_ref = format!("{}_{}", op, uuid::Uuid::new_v4().simple());
        processed.insert(token.to_string(), provider_ref.clone());
        Ok(provider_ref)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn authorize(
        &self,
        _amount_cents: i64,
        _payer_ref: &str,
        idem_token: &str,
    ) -> Result<String, GatewayError> {
        self.execute("auth", idem_token)
    }

    async fn capture(&self, _provider_ref: &str, idem_token: &str) -> Result<String, GatewayError> {
        self.execute("cap", idem_token)
    }

    async fn transfer(
        &self,
        _amount_cents: i64,
        _payee_ref: &str,
        idem_token: &str,
    ) -> Result<String, GatewayError> {
        self.execute("tr", idem_token)
    }

    async fn refund(
        &self,
        _provider_ref: &str,
        _amount_cents: i64,
        idem_token: &str,
    ) -> Result<String, GatewayError> {
        self.execute("re", idem_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_token_is_already_processed() {
        let gateway = MockPaymentGateway::new();

        let first = gateway.authorize(5000, "user:1", "ob-1-authorize").await;
        let first_ref = first.unwrap();

        let second = gateway.authorize(5000, "user:1", "ob-1-authorize").await;
        match second {
            Err(GatewayError::AlreadyProcessed(existing)) => assert_eq!(existing, first_ref),
            other => panic!("expected AlreadyProcessed, got {:?}", other),
        }

        assert_eq!(gateway.effect_count(), 1);
        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn test_scripted_transient_failures() {
        let gateway = MockPaymentGateway::new();
        gateway.set_transient_failures(2);

        assert!(matches!(
            gateway.transfer(100, "user:2", "ob-2-transfer").await,
            Err(GatewayError::Transient(_))
        ));
        assert!(matches!(
            gateway.transfer(100, "user:2", "ob-2-transfer").await,
            Err(GatewayError::Transient(_))
        ));
        // Third attempt with the same token succeeds, exactly once
        assert!(gateway.transfer(100, "user:2", "ob-2-transfer").await.is_ok());
        assert_eq!(gateway.effect_count(), 1);
    }

    #[tokio::test]
    async fn test_permanent_failure() {
        let gateway = MockPaymentGateway::new();
        gateway.set_fail_permanent(true);

        assert!(matches!(
            gateway.refund("auth_x", 100, "ob-3-refund").await,
            Err(GatewayError::Permanent(_))
        ));
        assert_eq!(gateway.effect_count(), 0);
    }
}
