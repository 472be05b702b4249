//! HTTP Payment Gateway
//!
//! reqwest-based client for the provider's REST API. Status mapping:
//! timeouts, connection failures, 429 and 5xx are `Transient`; a 409
//! duplicate-token response is `AlreadyProcessed`; every other 4xx is
//! `Permanent` (declined card, closed account, bad request).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{GatewayError, PaymentGateway};
use crate::config::ProviderConfig;

#[derive(Debug, Serialize)]
struct AuthorizeRequest<'a> {
    amount_cents: i64,
    payer_ref: &'a str,
}

#[derive(Debug, Serialize)]
struct CaptureRequest<'a> {
    provider_ref: &'a str,
}

#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    amount_cents: i64,
    payee_ref: &'a str,
}

#[derive(Debug, Serialize)]
struct RefundRequest<'a> {
    provider_ref: &'a str,
    amount_cents: i64,
}

#[derive(Debug, Deserialize)]
struct ProviderRefBody {
    #[serde(rename = "ref")]
    provider_ref: String,
}

pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPaymentGateway {
    pub fn new(config: &ProviderConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize>(
        &self,
        path: &str,
        body: &T,
        idem_token: &str,
    ) -> Result<String, GatewayError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .header("Idempotency-Key", idem_token)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Transient(e.to_string()))?;

        let status = response.status();

        if status.is_success() {
            let parsed: ProviderRefBody = response
                .json()
                .await
                .map_err(|e| GatewayError::Transient(format!("decode: {}", e)))?;
            return Ok(parsed.provider_ref);
        }

        if status.as_u16() == 409 {
            // Provider has seen this idempotency token before
            let parsed: ProviderRefBody = response
                .json()
                .await
                .map_err(|e| GatewayError::Transient(format!("decode: {}", e)))?;
            return Err(GatewayError::AlreadyProcessed(parsed.provider_ref));
        }

        if status.as_u16() == 429 || status.is_server_error() {
            return Err(GatewayError::Transient(format!(
                "provider returned {}",
                status
            )));
        }

        let detail = response.text().await.unwrap_or_default();
        Err(GatewayError::Permanent(format!(
            "provider returned {}: {}",
            status, detail
        )))
    }
}

#[async_trait::async_trait]
impl PaymentGateway for HttpPaymentGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn authorize(
        &self,
        amount_cents: i64,
        payer_ref: &str,
        idem_token: &str,
    ) -> Result<String, GatewayError> {
        self.post(
            "/v1/authorizations",
            &AuthorizeRequest {
                amount_cents,
                payer_ref,
            },
            idem_token,
        )
        .await
    }

    async fn capture(&self, provider_ref: &str, idem_token: &str) -> Result<String, GatewayError> {
        self.post("/v1/captures", &CaptureRequest { provider_ref }, idem_token)
            .await
    }

    async fn transfer(
        &self,
        amount_cents: i64,
        payee_ref: &str,
        idem_token: &str,
    ) -> Result<String, GatewayError> {
        self.post(
            "/v1/transfers",
            &TransferRequest {
                amount_cents,
                payee_ref,
            },
            idem_token,
        )
        .await
    }

    async fn refund(
        &self,
        provider_ref: &str,
        amount_cents: i64,
        idem_token: &str,
    ) -> Result<String, GatewayError> {
        self.post(
            "/v1/refunds",
            &RefundRequest {
                provider_ref,
                amount_cents,
            },
            idem_token,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = ProviderConfig {
            base_url: "http://localhost:9800/".to_string(),
            timeout_secs: 5,
            use_mock: false,
        };
        let gateway = HttpPaymentGateway::new(&config).unwrap();
        assert_eq!(gateway.base_url, "http://localhost:9800");
    }

    #[test]
    fn test_provider_ref_body_decode() {
        let body: ProviderRefBody = serde_json::from_str(r#"{"ref":"auth_abc123"}"#).unwrap();
        assert_eq!(body.provider_ref, "auth_abc123");
    }
}
