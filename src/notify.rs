//! Notification fan-out
//!
//! Fire-and-forget events for the notification service, published after
//! a wallet transaction reaches `completed`. Delivery failures are
//! logged and dropped; they must never block or roll back ledger state.

use async_trait::async_trait;
use serde::Serialize;

/// Event emitted after a transaction completes
#[derive(Debug, Clone, Serialize)]
pub struct LedgerNotification {
    /// e.g. "escrow.held", "escrow.released", "escrow.refunded"
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounty_id: Option<i64>,
    pub user_id: i64,
    pub amount_cents: i64,
}

impl LedgerNotification {
    pub fn escrow(event: &'static str, bounty_id: i64, user_id: i64, amount_cents: i64) -> Self {
        Self {
            event,
            bounty_id: Some(bounty_id),
            user_id,
            amount_cents,
        }
    }

    pub fn wallet(event: &'static str, user_id: i64, amount_cents: i64) -> Self {
        Self {
            event,
            bounty_id: None,
            user_id,
            amount_cents,
        }
    }
}

/// Notification service contract
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Best-effort delivery; implementations must swallow failures
    async fn publish(&self, notification: LedgerNotification);
}

/// Log-only notifier (default when no webhook is configured)
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, notification: LedgerNotification) {
        tracing::info!(
            event = notification.event,
            user_id = notification.user_id,
            bounty_id = ?notification.bounty_id,
            amount_cents = notification.amount_cents,
            "Notification"
        );
    }
}

/// POSTs notifications to the notification service. Errors are logged
/// at warn and otherwise ignored.
pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(url: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn publish(&self, notification: LedgerNotification) {
        let result = self
            .client
            .post(&self.url)
            .json(&notification)
            .send()
            .await;

        if let Err(e) = result {
            tracing::warn!(
                event = notification.event,
                error = %e,
                "Notification delivery failed (dropped)"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_json_shape() {
        let n = LedgerNotification::escrow("escrow.released", 42, 2002, 2850);
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("\"escrow.released\""));
        assert!(json.contains("\"bounty_id\":42"));

        let w = LedgerNotification::wallet("deposit.confirmed", 7, 1000);
        let json = serde_json::to_string(&w).unwrap();
        assert!(!json.contains("bounty_id"));
    }

    #[tokio::test]
    async fn test_log_notifier_is_infallible() {
        LogNotifier
            .publish(LedgerNotification::wallet("withdrawal.sent", 1, -500))
            .await;
    }
}
