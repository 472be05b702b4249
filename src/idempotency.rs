//! Idempotency Registry
//!
//! Durable key -> result cache so every externally-triggerable
//! operation (HTTP request, webhook delivery, outbox replay) is safe to
//! execute more than once. Keys are reserved *before* any side effect,
//! on the caller's own database transaction, so two racing duplicates
//! cannot both pass the check.

use sqlx::{PgConnection, PgPool, Row};

use crate::error::LedgerError;

/// Registry row status
pub mod status {
    pub const RESERVED: i16 = 0;
    pub const COMPLETED: i16 = 20;
}

/// Result of a reserve attempt
#[derive(Debug, Clone)]
pub enum Reservation {
    /// Key is now owned by this caller; proceed with side effects
    Reserved,
    /// Operation already ran; the cached result snapshot (JSON)
    AlreadyCompleted(String),
    /// A concurrent duplicate holds a live reservation
    InProgress,
}

/// Fingerprint of the request parameters, stored with the reservation
/// so a key reused with different parameters is rejected as a conflict.
pub fn fingerprint<T: serde::Serialize>(params: &T) -> String {
    let canonical = serde_json::to_string(params).unwrap_or_default();
    format!("{:x}", md5::compute(canonical))
}

/// Atomically reserve `key` or report the existing record.
///
/// Runs on the caller's connection so the reservation commits or rolls
/// back together with the ledger writes it guards.
pub async fn check_or_reserve(
    conn: &mut PgConnection,
    key: &str,
    scope: &str,
    request_fingerprint: &str,
    reservation_ttl_secs: u64,
) -> Result<Reservation, LedgerError> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO idempotency_tb (key, scope, status, fingerprint, expires_at)
        VALUES ($1, $2, $3, $4, NOW() + INTERVAL '1 second' * $5)
        ON CONFLICT (key) DO NOTHING
        "#,
    )
    .bind(key)
    .bind(scope)
    .bind(status::RESERVED)
    .bind(request_fingerprint)
    .bind(reservation_ttl_secs as i64)
    .execute(&mut *conn)
    .await?;

    if inserted.rows_affected() > 0 {
        return Ok(Reservation::Reserved);
    }

    let row = sqlx::query(
        r#"
        SELECT scope, status, fingerprint, result_snapshot,
               (expires_at < NOW()) AS expired
        FROM idempotency_tb
        WHERE key = $1
        "#,
    )
    .bind(key)
    .fetch_one(&mut *conn)
    .await?;

    let existing_scope: String = row.get("scope");
    let existing_fingerprint: String = row.get("fingerprint");
    if existing_scope != scope || existing_fingerprint != request_fingerprint {
        return Err(LedgerError::KeyParameterMismatch);
    }

    let record_status: i16 = row.get("status");
    if record_status == status::COMPLETED {
        let snapshot: Option<String> = row.get("result_snapshot");
        return Ok(Reservation::AlreadyCompleted(
            snapshot.unwrap_or_else(|| "null".to_string()),
        ));
    }

    // Bare reservation. A live one means a concurrent duplicate is
    // mid-flight; an expired one belongs to a crashed caller and can be
    // taken over in place.
    let expired: bool = row.get("expired");
    if expired {
        let taken = sqlx::query(
            r#"
            UPDATE idempotency_tb
            SET expires_at = NOW() + INTERVAL '1 second' * $2, created_at = NOW()
            WHERE key = $1 AND status = $3 AND expires_at < NOW()
            "#,
        )
        .bind(key)
        .bind(reservation_ttl_secs as i64)
        .bind(status::RESERVED)
        .execute(&mut *conn)
        .await?;

        if taken.rows_affected() > 0 {
            return Ok(Reservation::Reserved);
        }
    }

    Ok(Reservation::InProgress)
}

/// Store the final result against a reserved key.
///
/// Must run on the same transaction as the operation's writes so the
/// snapshot and the side effects become visible atomically.
pub async fn commit(
    conn: &mut PgConnection,
    key: &str,
    result_snapshot: &str,
    snapshot_ttl_secs: u64,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        UPDATE idempotency_tb
        SET status = $2, result_snapshot = $3,
            expires_at = NOW() + INTERVAL '1 second' * $4
        WHERE key = $1
        "#,
    )
    .bind(key)
    .bind(status::COMPLETED)
    .bind(result_snapshot)
    .bind(snapshot_ttl_secs as i64)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Pool-level maintenance API
pub struct IdempotencyStore {
    pool: PgPool,
}

impl IdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Drop expired rows. Returns the number removed.
    pub async fn sweep_expired(&self) -> Result<u64, LedgerError> {
        let result = sqlx::query("DELETE FROM idempotency_tb WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            tracing::debug!(removed = removed, "Swept expired idempotency records");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_deterministic() {
        #[derive(serde::Serialize)]
        struct Params {
            bounty_id: i64,
            amount_cents: i64,
        }

        let a = fingerprint(&Params {
            bounty_id: 1,
            amount_cents: 5000,
        });
        let b = fingerprint(&Params {
            bounty_id: 1,
            amount_cents: 5000,
        });
        let c = fingerprint(&Params {
            bounty_id: 1,
            amount_cents: 5001,
        });

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_status_ids() {
        assert_eq!(status::RESERVED, 0);
        assert_eq!(status::COMPLETED, 20);
    }
}
