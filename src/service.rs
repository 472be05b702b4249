//! Ledger Service Façade
//!
//! Orchestrates the ledger store, idempotency registry, escrow state
//! machine and outbox to implement the money-moving operations. Each
//! operation is one local database transaction:
//!
//! 1. reserve the idempotency key (before any side effect)
//! 2. write the provisional wallet transaction / escrow rows
//! 3. enqueue the outbox event describing the external call
//! 4. commit the idempotency result snapshot
//!
//! The external provider is never called here; that happens in the
//! outbox worker, so façade latency is independent of provider latency.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::IdempotencyConfig;
use crate::error::LedgerError;
use crate::escrow::{self, EscrowRecord, EscrowState};
use crate::idempotency::{self, Reservation};
use crate::notify::{LedgerNotification, Notifier};
use crate::outbox::{self, EventPayload};
use crate::store::ledger::{self, MAX_BALANCE_RETRIES, SettleOutcome};
use crate::types::{PLATFORM_ACCOUNT_ID, TxnStatus, TxnType, WalletAccount, WalletTransaction};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEscrowRequest {
    pub bounty_id: i64,
    pub poster_id: i64,
    pub hunter_id: Option<i64>,
    pub amount_cents: i64,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseEscrowRequest {
    pub bounty_id: i64,
    pub platform_fee_cents: i64,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundEscrowRequest {
    pub bounty_id: i64,
    pub reason: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositRequest {
    pub user_id: i64,
    pub amount_cents: i64,
    /// Provider charge reference reported by the client checkout flow
    pub provider_ref: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawRequest {
    pub user_id: i64,
    pub amount_cents: i64,
    pub idempotency_key: String,
}

/// Asynchronous confirmation/failure callback from the provider
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderWebhook {
    /// Provider's own event id; the idempotency key for this delivery
    pub event_id: String,
    pub kind: String,
    pub provider_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// State changed (e.g. a pending deposit completed)
    Applied,
    /// Same provider event seen before; no effect
    Duplicate,
    /// Recognized delivery with nothing to apply
    Ignored,
}

pub struct LedgerService {
    pool: PgPool,
    idem: IdempotencyConfig,
    notifier: Arc<dyn Notifier>,
}

impl LedgerService {
    pub fn new(pool: PgPool, idem: IdempotencyConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            pool,
            idem,
            notifier,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Hold a poster's funds against a bounty.
    ///
    /// Replays with the same key return the original record; a second
    /// escrow attempt for the bounty under a different key is a
    /// conflict, not a silent no-op.
    pub async fn create_escrow(
        &self,
        req: CreateEscrowRequest,
    ) -> Result<EscrowRecord, LedgerError> {
        if req.amount_cents <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if req.idempotency_key.is_empty() {
            return Err(LedgerError::MissingIdempotencyKey);
        }

        let fp = idempotency::fingerprint(&(
            req.bounty_id,
            req.poster_id,
            req.hunter_id,
            req.amount_cents,
        ));

        let mut tx = self.pool.begin().await?;

        match idempotency::check_or_reserve(
            &mut tx,
            &req.idempotency_key,
            "escrow.create",
            &fp,
            self.idem.reservation_ttl_secs,
        )
        .await?
        {
            Reservation::Reserved => {}
            Reservation::AlreadyCompleted(snapshot) => {
                tx.rollback().await?;
                return Ok(serde_json::from_str(&snapshot)?);
            }
            Reservation::InProgress => {
                tx.rollback().await?;
                return Err(LedgerError::InProgress);
            }
        }

        if escrow::get_for_update(&mut tx, req.bounty_id).await?.is_some() {
            tx.rollback().await?;
            return Err(LedgerError::AlreadyEscrowed);
        }

        ledger::ensure_account(&mut tx, req.poster_id).await?;
        let available = ledger::available_balance(&mut tx, req.poster_id).await?;
        if available < req.amount_cents {
            tx.rollback().await?;
            return Err(LedgerError::InsufficientBalance);
        }

        let hold = WalletTransaction::pending(
            req.poster_id,
            TxnType::Escrow,
            -req.amount_cents,
            Some(req.bounty_id),
            &req.idempotency_key,
        );
        ledger::insert_txn(&mut tx, &hold).await?;

        let now = chrono::Utc::now().timestamp_millis();
        let record = EscrowRecord {
            bounty_id: req.bounty_id,
            poster_id: req.poster_id,
            hunter_id: req.hunter_id,
            amount_cents: req.amount_cents,
            state: EscrowState::Held,
            hold_txn_id: hold.txn_id,
            settlement_txn_id: None,
            platform_fee_cents: 0,
            created_at: now,
            updated_at: now,
        };
        if !escrow::insert_held(&mut tx, &record).await? {
            // Lost a race with a concurrent create for the same bounty
            tx.rollback().await?;
            return Err(LedgerError::AlreadyEscrowed);
        }

        outbox::enqueue(
            &mut tx,
            &EventPayload::EscrowHold {
                bounty_id: req.bounty_id,
                poster_id: req.poster_id,
                amount_cents: req.amount_cents,
                hold_txn_id: hold.txn_id,
            },
        )
        .await?;

        let snapshot = serde_json::to_string(&record)?;
        idempotency::commit(
            &mut tx,
            &req.idempotency_key,
            &snapshot,
            self.idem.snapshot_ttl_secs,
        )
        .await?;

        tx.commit().await?;

        info!(
            bounty_id = req.bounty_id,
            poster_id = req.poster_id,
            amount_cents = req.amount_cents,
            "Escrow held"
        );

        Ok(record)
    }

    /// Pay out a held escrow to the hunter, minus the platform fee.
    pub async fn release_escrow(
        &self,
        req: ReleaseEscrowRequest,
    ) -> Result<WalletTransaction, LedgerError> {
        if req.platform_fee_cents < 0 {
            return Err(LedgerError::Validation(
                "platform fee must not be negative".to_string(),
            ));
        }
        if req.idempotency_key.is_empty() {
            return Err(LedgerError::MissingIdempotencyKey);
        }

        let fp = idempotency::fingerprint(&(req.bounty_id, req.platform_fee_cents));

        let mut tx = self.pool.begin().await?;

        match idempotency::check_or_reserve(
            &mut tx,
            &req.idempotency_key,
            "escrow.release",
            &fp,
            self.idem.reservation_ttl_secs,
        )
        .await?
        {
            Reservation::Reserved => {}
            Reservation::AlreadyCompleted(snapshot) => {
                tx.rollback().await?;
                return Ok(serde_json::from_str(&snapshot)?);
            }
            Reservation::InProgress => {
                tx.rollback().await?;
                return Err(LedgerError::InProgress);
            }
        }

        let record = escrow::get_for_update(&mut tx, req.bounty_id)
            .await?
            .ok_or(LedgerError::EscrowNotFound(req.bounty_id))?;

        if record.state != EscrowState::Held {
            tx.rollback().await?;
            return Err(LedgerError::InvalidState {
                expected: EscrowState::Held.as_str().to_string(),
                found: record.state.as_str().to_string(),
            });
        }
        if req.platform_fee_cents > record.amount_cents {
            tx.rollback().await?;
            return Err(LedgerError::FeeExceedsAmount);
        }
        let hunter_id = record.hunter_id.ok_or_else(|| {
            LedgerError::Validation("escrow has no hunter assigned".to_string())
        })?;

        // Ordering guard: the hold's provider authorization must have
        // confirmed before any settlement is attempted.
        let hold_ref = self.confirmed_hold_ref(&mut tx, &record).await?;

        let release = WalletTransaction::pending(
            hunter_id,
            TxnType::Release,
            record.amount_cents - req.platform_fee_cents,
            Some(req.bounty_id),
            &req.idempotency_key,
        );
        ledger::insert_txn(&mut tx, &release).await?;

        let fee_txn = if req.platform_fee_cents > 0 {
            let fee = WalletTransaction::pending(
                PLATFORM_ACCOUNT_ID,
                TxnType::PlatformFee,
                req.platform_fee_cents,
                Some(req.bounty_id),
                &req.idempotency_key,
            );
            ledger::insert_txn(&mut tx, &fee).await?;
            Some(fee)
        } else {
            None
        };

        if !escrow::settle(
            &mut tx,
            req.bounty_id,
            EscrowState::Released,
            release.txn_id,
            req.platform_fee_cents,
        )
        .await?
        {
            tx.rollback().await?;
            return Err(LedgerError::Conflict(
                "escrow settled concurrently".to_string(),
            ));
        }

        outbox::enqueue(
            &mut tx,
            &EventPayload::EscrowRelease {
                bounty_id: req.bounty_id,
                hunter_id,
                amount_cents: record.amount_cents,
                platform_fee_cents: req.platform_fee_cents,
                release_txn_id: release.txn_id,
                fee_txn_id: fee_txn.as_ref().map(|f| f.txn_id),
                hold_ref,
            },
        )
        .await?;

        let snapshot = serde_json::to_string(&release)?;
        idempotency::commit(
            &mut tx,
            &req.idempotency_key,
            &snapshot,
            self.idem.snapshot_ttl_secs,
        )
        .await?;

        tx.commit().await?;

        info!(
            bounty_id = req.bounty_id,
            hunter_id = hunter_id,
            amount_cents = record.amount_cents,
            platform_fee_cents = req.platform_fee_cents,
            "Escrow released"
        );

        Ok(release)
    }

    /// Return a held escrow to the poster in full.
    ///
    /// Refunding an already-released escrow is rejected: the work was
    /// paid out and cancellation is no longer possible.
    pub async fn refund_escrow(
        &self,
        req: RefundEscrowRequest,
    ) -> Result<WalletTransaction, LedgerError> {
        if req.idempotency_key.is_empty() {
            return Err(LedgerError::MissingIdempotencyKey);
        }

        let fp = idempotency::fingerprint(&(req.bounty_id, &req.reason));

        let mut tx = self.pool.begin().await?;

        match idempotency::check_or_reserve(
            &mut tx,
            &req.idempotency_key,
            "escrow.refund",
            &fp,
            self.idem.reservation_ttl_secs,
        )
        .await?
        {
            Reservation::Reserved => {}
            Reservation::AlreadyCompleted(snapshot) => {
                tx.rollback().await?;
                return Ok(serde_json::from_str(&snapshot)?);
            }
            Reservation::InProgress => {
                tx.rollback().await?;
                return Err(LedgerError::InProgress);
            }
        }

        let record = escrow::get_for_update(&mut tx, req.bounty_id)
            .await?
            .ok_or(LedgerError::EscrowNotFound(req.bounty_id))?;

        if record.state != EscrowState::Held {
            tx.rollback().await?;
            return Err(LedgerError::InvalidState {
                expected: EscrowState::Held.as_str().to_string(),
                found: record.state.as_str().to_string(),
            });
        }

        let hold_ref = self.confirmed_hold_ref(&mut tx, &record).await?;

        let refund = WalletTransaction::pending(
            record.poster_id,
            TxnType::Refund,
            record.amount_cents,
            Some(req.bounty_id),
            &req.idempotency_key,
        );
        ledger::insert_txn(&mut tx, &refund).await?;

        if !escrow::settle(
            &mut tx,
            req.bounty_id,
            EscrowState::Refunded,
            refund.txn_id,
            0,
        )
        .await?
        {
            tx.rollback().await?;
            return Err(LedgerError::Conflict(
                "escrow settled concurrently".to_string(),
            ));
        }

        outbox::enqueue(
            &mut tx,
            &EventPayload::EscrowRefund {
                bounty_id: req.bounty_id,
                poster_id: record.poster_id,
                amount_cents: record.amount_cents,
                refund_txn_id: refund.txn_id,
                hold_ref,
            },
        )
        .await?;

        let snapshot = serde_json::to_string(&refund)?;
        idempotency::commit(
            &mut tx,
            &req.idempotency_key,
            &snapshot,
            self.idem.snapshot_ttl_secs,
        )
        .await?;

        tx.commit().await?;

        info!(
            bounty_id = req.bounty_id,
            poster_id = record.poster_id,
            amount_cents = record.amount_cents,
            reason = %req.reason,
            "Escrow refunded"
        );

        Ok(refund)
    }

    /// Record an incoming deposit charge; the balance credits once the
    /// outbox worker captures it at the provider.
    pub async fn deposit(&self, req: DepositRequest) -> Result<WalletTransaction, LedgerError> {
        if req.amount_cents <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if req.idempotency_key.is_empty() {
            return Err(LedgerError::MissingIdempotencyKey);
        }
        if req.provider_ref.is_empty() {
            return Err(LedgerError::Validation(
                "missing provider charge reference".to_string(),
            ));
        }

        let fp =
            idempotency::fingerprint(&(req.user_id, req.amount_cents, &req.provider_ref));

        let mut tx = self.pool.begin().await?;

        match idempotency::check_or_reserve(
            &mut tx,
            &req.idempotency_key,
            "wallet.deposit",
            &fp,
            self.idem.reservation_ttl_secs,
        )
        .await?
        {
            Reservation::Reserved => {}
            Reservation::AlreadyCompleted(snapshot) => {
                tx.rollback().await?;
                return Ok(serde_json::from_str(&snapshot)?);
            }
            Reservation::InProgress => {
                tx.rollback().await?;
                return Err(LedgerError::InProgress);
            }
        }

        let mut deposit = WalletTransaction::pending(
            req.user_id,
            TxnType::Deposit,
            req.amount_cents,
            None,
            &req.idempotency_key,
        );
        deposit.external_ref = Some(req.provider_ref.clone());
        ledger::insert_txn(&mut tx, &deposit).await?;

        outbox::enqueue(
            &mut tx,
            &EventPayload::DepositConfirm {
                user_id: req.user_id,
                amount_cents: req.amount_cents,
                deposit_txn_id: deposit.txn_id,
                provider_ref: req.provider_ref.clone(),
            },
        )
        .await?;

        let snapshot = serde_json::to_string(&deposit)?;
        idempotency::commit(
            &mut tx,
            &req.idempotency_key,
            &snapshot,
            self.idem.snapshot_ttl_secs,
        )
        .await?;

        tx.commit().await?;

        info!(
            user_id = req.user_id,
            amount_cents = req.amount_cents,
            "Deposit recorded"
        );

        Ok(deposit)
    }

    /// Queue a withdrawal transfer to the user.
    pub async fn withdraw(&self, req: WithdrawRequest) -> Result<WalletTransaction, LedgerError> {
        if req.amount_cents <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if req.idempotency_key.is_empty() {
            return Err(LedgerError::MissingIdempotencyKey);
        }

        let fp = idempotency::fingerprint(&(req.user_id, req.amount_cents));

        let mut tx = self.pool.begin().await?;

        match idempotency::check_or_reserve(
            &mut tx,
            &req.idempotency_key,
            "wallet.withdraw",
            &fp,
            self.idem.reservation_ttl_secs,
        )
        .await?
        {
            Reservation::Reserved => {}
            Reservation::AlreadyCompleted(snapshot) => {
                tx.rollback().await?;
                return Ok(serde_json::from_str(&snapshot)?);
            }
            Reservation::InProgress => {
                tx.rollback().await?;
                return Err(LedgerError::InProgress);
            }
        }

        ledger::ensure_account(&mut tx, req.user_id).await?;
        let available = ledger::available_balance(&mut tx, req.user_id).await?;
        if available < req.amount_cents {
            tx.rollback().await?;
            return Err(LedgerError::InsufficientBalance);
        }

        let withdrawal = WalletTransaction::pending(
            req.user_id,
            TxnType::Withdrawal,
            -req.amount_cents,
            None,
            &req.idempotency_key,
        );
        ledger::insert_txn(&mut tx, &withdrawal).await?;

        outbox::enqueue(
            &mut tx,
            &EventPayload::WithdrawalTransfer {
                user_id: req.user_id,
                amount_cents: req.amount_cents,
                withdrawal_txn_id: withdrawal.txn_id,
            },
        )
        .await?;

        let snapshot = serde_json::to_string(&withdrawal)?;
        idempotency::commit(
            &mut tx,
            &req.idempotency_key,
            &snapshot,
            self.idem.snapshot_ttl_secs,
        )
        .await?;

        tx.commit().await?;

        info!(
            user_id = req.user_id,
            amount_cents = req.amount_cents,
            "Withdrawal queued"
        );

        Ok(withdrawal)
    }

    /// Ingest a provider webhook, deduped by the provider's event id.
    pub async fn process_webhook(
        &self,
        hook: ProviderWebhook,
    ) -> Result<WebhookOutcome, LedgerError> {
        if hook.event_id.is_empty() {
            return Err(LedgerError::Validation(
                "missing provider event id".to_string(),
            ));
        }

        let key = format!("webhook:{}", hook.event_id);
        let fp = idempotency::fingerprint(&(&hook.kind, &hook.provider_ref));

        for _ in 0..MAX_BALANCE_RETRIES {
            let mut tx = self.pool.begin().await?;

            match idempotency::check_or_reserve(
                &mut tx,
                &key,
                "webhook",
                &fp,
                self.idem.reservation_ttl_secs,
            )
            .await?
            {
                Reservation::Reserved => {}
                Reservation::AlreadyCompleted(_) => {
                    tx.rollback().await?;
                    return Ok(WebhookOutcome::Duplicate);
                }
                Reservation::InProgress => {
                    tx.rollback().await?;
                    return Err(LedgerError::InProgress);
                }
            }

            let outcome = match hook.kind.as_str() {
                "payment_succeeded" => {
                    match ledger::find_pending_by_external_ref(
                        &mut tx,
                        &hook.provider_ref,
                        TxnType::Deposit,
                    )
                    .await?
                    {
                        Some(deposit) => {
                            match ledger::settle_txn(&mut tx, deposit.txn_id, None).await? {
                                SettleOutcome::Settled(_) | SettleOutcome::AlreadyFinal => {
                                    Some((WebhookOutcome::Applied, deposit))
                                }
                                SettleOutcome::VersionConflict => {
                                    tx.rollback().await?;
                                    continue;
                                }
                                SettleOutcome::NotFound => {
                                    tx.rollback().await?;
                                    return Err(LedgerError::Internal(
                                        "deposit row vanished during webhook".to_string(),
                                    ));
                                }
                            }
                        }
                        None => None,
                    }
                }
                _ => None,
            };

            let (result, notification) = match outcome {
                Some((applied, deposit)) => (
                    applied,
                    Some(LedgerNotification::wallet(
                        "deposit.confirmed",
                        deposit.user_id,
                        deposit.amount_cents,
                    )),
                ),
                None => {
                    warn!(
                        kind = %hook.kind,
                        provider_ref = %hook.provider_ref,
                        "Webhook acknowledged with nothing to apply"
                    );
                    (WebhookOutcome::Ignored, None)
                }
            };

            let snapshot = serde_json::to_string(&result)?;
            idempotency::commit(&mut tx, &key, &snapshot, self.idem.snapshot_ttl_secs).await?;
            tx.commit().await?;

            if let Some(notification) = notification {
                self.notifier.publish(notification).await;
            }
            return Ok(result);
        }

        Err(LedgerError::ConcurrencyExhausted)
    }

    /// Point read of a user's balance projection
    pub async fn get_balance(&self, user_id: i64) -> Result<WalletAccount, LedgerError> {
        ledger::LedgerStore::new(self.pool.clone())
            .get_balance(user_id)
            .await
    }

    /// Point read of a bounty's escrow record
    pub async fn get_escrow(&self, bounty_id: i64) -> Result<Option<EscrowRecord>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        escrow::get(&mut conn, bounty_id).await
    }

    /// Require the hold transaction to be confirmed and return its
    /// provider authorization ref.
    async fn confirmed_hold_ref(
        &self,
        tx: &mut sqlx::PgConnection,
        record: &EscrowRecord,
    ) -> Result<String, LedgerError> {
        let hold = ledger::get_txn(tx, record.hold_txn_id)
            .await?
            .ok_or_else(|| LedgerError::Internal("escrow hold transaction missing".to_string()))?;

        if hold.status != TxnStatus::Completed {
            return Err(LedgerError::HoldUnconfirmed);
        }
        hold.external_ref.ok_or(LedgerError::HoldUnconfirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_outcome_snapshot_roundtrip() {
        let json = serde_json::to_string(&WebhookOutcome::Applied).unwrap();
        assert_eq!(json, "\"applied\"");
        let back: WebhookOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, WebhookOutcome::Applied);
    }

    #[test]
    fn test_request_deserialization() {
        let req: CreateEscrowRequest = serde_json::from_str(
            r#"{"bounty_id":1,"poster_id":1001,"hunter_id":2002,"amount_cents":3000,"idempotency_key":"k1"}"#,
        )
        .unwrap();
        assert_eq!(req.hunter_id, Some(2002));

        let req: ReleaseEscrowRequest = serde_json::from_str(
            r#"{"bounty_id":1,"platform_fee_cents":150,"idempotency_key":"k2"}"#,
        )
        .unwrap();
        assert_eq!(req.platform_fee_cents, 150);
    }
}
