//! Wallet transaction log and balance projection
//!
//! All balance mutations go through the optimistic-concurrency path:
//! read `version`, compute the new balance, write guarded by
//! `WHERE version = old`. A missed guard means another writer won the
//! row; callers retry the whole unit a bounded number of times before
//! surfacing `ConcurrencyExhausted`.

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};

use crate::error::LedgerError;
use crate::types::{TxnId, TxnStatus, TxnType, WalletAccount, WalletTransaction};

/// Bounded retries for the read-compute-write cycle
pub const MAX_BALANCE_RETRIES: u32 = 5;

/// Outcome of settling one pending transaction
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    /// Row moved to completed and the balance projection was updated
    Settled(WalletAccount),
    /// Row was already in a terminal state; nothing applied
    AlreadyFinal,
    /// Account version guard missed; caller must retry its transaction
    VersionConflict,
    /// No such transaction row
    NotFound,
}

/// Create the account row if absent (accounts are created lazily)
pub async fn ensure_account(conn: &mut PgConnection, user_id: i64) -> Result<(), LedgerError> {
    sqlx::query("INSERT INTO wallet_accounts_tb (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Point read of the balance projection
pub async fn account_row(
    conn: &mut PgConnection,
    user_id: i64,
) -> Result<Option<WalletAccount>, LedgerError> {
    let row = sqlx::query(
        "SELECT user_id, balance_cents, version FROM wallet_accounts_tb WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|r| WalletAccount {
        user_id: r.get("user_id"),
        balance_cents: r.get("balance_cents"),
        version: r.get("version"),
    }))
}

/// Available balance (completed transactions only). Missing account
/// rows read as zero.
pub async fn available_balance(conn: &mut PgConnection, user_id: i64) -> Result<i64, LedgerError> {
    Ok(account_row(conn, user_id)
        .await?
        .map(|a| a.balance_cents)
        .unwrap_or(0))
}

/// Insert a transaction row. Idempotent on `txn_id`.
///
/// Returns true if the row was inserted, false if it already existed.
pub async fn insert_txn(
    conn: &mut PgConnection,
    txn: &WalletTransaction,
) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        r#"
        INSERT INTO wallet_txns_tb
            (txn_id, user_id, txn_type, amount_cents, bounty_id, status,
             external_ref, idempotency_key, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
        ON CONFLICT (txn_id) DO NOTHING
        "#,
    )
    .bind(txn.txn_id.to_string())
    .bind(txn.user_id)
    .bind(txn.txn_type.id())
    .bind(txn.amount_cents)
    .bind(txn.bounty_id)
    .bind(TxnStatus::Pending.id())
    .bind(&txn.external_ref)
    .bind(&txn.idempotency_key)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Get a transaction row by id
pub async fn get_txn(
    conn: &mut PgConnection,
    txn_id: TxnId,
) -> Result<Option<WalletTransaction>, LedgerError> {
    let row = sqlx::query(
        r#"
        SELECT txn_id, user_id, txn_type, amount_cents, bounty_id, status,
               external_ref, idempotency_key, created_at, updated_at
        FROM wallet_txns_tb
        WHERE txn_id = $1
        "#,
    )
    .bind(txn_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(row_to_txn(&row)?)),
        None => Ok(None),
    }
}

/// Find a pending transaction by provider reference (webhook ingestion)
pub async fn find_pending_by_external_ref(
    conn: &mut PgConnection,
    external_ref: &str,
    txn_type: TxnType,
) -> Result<Option<WalletTransaction>, LedgerError> {
    let row = sqlx::query(
        r#"
        SELECT txn_id, user_id, txn_type, amount_cents, bounty_id, status,
               external_ref, idempotency_key, created_at, updated_at
        FROM wallet_txns_tb
        WHERE external_ref = $1 AND txn_type = $2 AND status = $3
        "#,
    )
    .bind(external_ref)
    .bind(txn_type.id())
    .bind(TxnStatus::Pending.id())
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(row_to_txn(&row)?)),
        None => Ok(None),
    }
}

/// CAS pending -> completed and apply the amount to the balance
/// projection, all on the caller's connection so it joins the caller's
/// transaction.
pub async fn settle_txn(
    conn: &mut PgConnection,
    txn_id: TxnId,
    external_ref: Option<&str>,
) -> Result<SettleOutcome, LedgerError> {
    let row = sqlx::query(
        r#"
        UPDATE wallet_txns_tb
        SET status = $1, external_ref = COALESCE($2, external_ref), updated_at = NOW()
        WHERE txn_id = $3 AND status = $4
        RETURNING user_id, amount_cents
        "#,
    )
    .bind(TxnStatus::Completed.id())
    .bind(external_ref)
    .bind(txn_id.to_string())
    .bind(TxnStatus::Pending.id())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        let status: Option<i16> =
            sqlx::query_scalar("SELECT status FROM wallet_txns_tb WHERE txn_id = $1")
                .bind(txn_id.to_string())
                .fetch_optional(&mut *conn)
                .await?;
        return Ok(match status {
            Some(_) => SettleOutcome::AlreadyFinal,
            None => SettleOutcome::NotFound,
        });
    };

    let user_id: i64 = row.get("user_id");
    let amount_cents: i64 = row.get("amount_cents");

    ensure_account(conn, user_id).await?;
    let account = account_row(conn, user_id)
        .await?
        .ok_or_else(|| LedgerError::Internal("account row missing after ensure".to_string()))?;

    let new_balance = account.balance_cents + amount_cents;
    let result = sqlx::query(
        r#"
        UPDATE wallet_accounts_tb
        SET balance_cents = $1, version = version + 1, updated_at = NOW()
        WHERE user_id = $2 AND version = $3
        "#,
    )
    .bind(new_balance)
    .bind(user_id)
    .bind(account.version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(SettleOutcome::VersionConflict);
    }

    Ok(SettleOutcome::Settled(WalletAccount {
        user_id,
        balance_cents: new_balance,
        version: account.version + 1,
    }))
}

/// CAS pending -> failed. Returns true if this call performed the move.
pub async fn fail_txn(conn: &mut PgConnection, txn_id: TxnId) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        "UPDATE wallet_txns_tb SET status = $1, updated_at = NOW() WHERE txn_id = $2 AND status = $3",
    )
    .bind(TxnStatus::Failed.id())
    .bind(txn_id.to_string())
    .bind(TxnStatus::Pending.id())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn row_to_txn(row: &PgRow) -> Result<WalletTransaction, LedgerError> {
    let txn_id_str: String = row.get("txn_id");
    let txn_id: TxnId = txn_id_str
        .parse()
        .map_err(|_| LedgerError::Internal("Invalid txn_id format".to_string()))?;

    let type_id: i16 = row.get("txn_type");
    let txn_type = TxnType::from_id(type_id)
        .ok_or_else(|| LedgerError::Internal(format!("Invalid txn_type: {}", type_id)))?;

    let status_id: i16 = row.get("status");
    let status = TxnStatus::from_id(status_id)
        .ok_or_else(|| LedgerError::Internal(format!("Invalid txn status: {}", status_id)))?;

    let created_at: chrono::DateTime<chrono::Utc> = row.get("created_at");
    let updated_at: chrono::DateTime<chrono::Utc> = row.get("updated_at");

    Ok(WalletTransaction {
        txn_id,
        user_id: row.get("user_id"),
        txn_type,
        amount_cents: row.get("amount_cents"),
        bounty_id: row.get("bounty_id"),
        status,
        external_ref: row.get("external_ref"),
        idempotency_key: row.get("idempotency_key"),
        created_at: created_at.timestamp_millis(),
        updated_at: updated_at.timestamp_millis(),
    })
}

/// Pool-level store API
pub struct LedgerStore {
    pool: PgPool,
}

impl LedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Point read of `(balance_cents, version)`; zeros for unknown users
    pub async fn get_balance(&self, user_id: i64) -> Result<WalletAccount, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(account_row(&mut conn, user_id)
            .await?
            .unwrap_or(WalletAccount {
                user_id,
                balance_cents: 0,
                version: 0,
            }))
    }

    /// Insert a transaction and, if it is completed, apply it to the
    /// balance projection in one atomic unit.
    ///
    /// Retries the read-compute-write cycle on version conflicts up to
    /// [`MAX_BALANCE_RETRIES`] times before surfacing
    /// `ConcurrencyExhausted`.
    pub async fn apply_transaction(
        &self,
        txn: &WalletTransaction,
    ) -> Result<WalletAccount, LedgerError> {
        for _ in 0..MAX_BALANCE_RETRIES {
            let mut tx = self.pool.begin().await?;
            insert_txn(&mut tx, txn).await?;

            if txn.status != TxnStatus::Completed {
                let account = account_row(&mut tx, txn.user_id).await?;
                tx.commit().await?;
                return Ok(account.unwrap_or(WalletAccount {
                    user_id: txn.user_id,
                    balance_cents: 0,
                    version: 0,
                }));
            }

            match settle_txn(&mut tx, txn.txn_id, txn.external_ref.as_deref()).await? {
                SettleOutcome::Settled(account) => {
                    tx.commit().await?;
                    return Ok(account);
                }
                SettleOutcome::AlreadyFinal => {
                    tx.commit().await?;
                    return self.get_balance(txn.user_id).await;
                }
                SettleOutcome::VersionConflict => {
                    tx.rollback().await?;
                    continue;
                }
                SettleOutcome::NotFound => {
                    tx.rollback().await?;
                    return Err(LedgerError::Internal(
                        "transaction row vanished during apply".to_string(),
                    ));
                }
            }
        }

        Err(LedgerError::ConcurrencyExhausted)
    }

    /// Recompute the balance from the transaction log.
    ///
    /// Reconciliation/test path only; the hot path reads the projection.
    pub async fn recompute_balance(&self, user_id: i64) -> Result<i64, LedgerError> {
        let sum: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(amount_cents)::BIGINT FROM wallet_txns_tb WHERE user_id = $1 AND status = $2",
        )
        .bind(user_id)
        .bind(TxnStatus::Completed.id())
        .fetch_one(&self.pool)
        .await?;

        Ok(sum.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_outcome_debug() {
        // Sanity on the outcome shapes used in worker match arms
        let settled = SettleOutcome::Settled(WalletAccount {
            user_id: 1,
            balance_cents: 100,
            version: 1,
        });
        assert!(matches!(settled, SettleOutcome::Settled(_)));
        assert!(matches!(
            SettleOutcome::VersionConflict,
            SettleOutcome::VersionConflict
        ));
    }

    #[test]
    fn test_retry_bound() {
        assert_eq!(MAX_BALANCE_RETRIES, 5);
    }
}
