//! Escrow State Machine
//!
//! Per-bounty record tracking the hold/release/refund lifecycle.
//!
//! ```text
//! (no row) → HELD → RELEASED
//!                 → REFUNDED
//! ```
//!
//! # Safety Invariants
//!
//! 1. **CAS transitions**: settlement flips state with
//!    `UPDATE … WHERE state = HELD`; a missed guard means another
//!    caller settled first.
//! 2. **Hold-before-settle**: release/refund additionally require the
//!    hold transaction to be completed (provider authorization
//!    confirmed). This is what orders events per bounty without any
//!    global queue ordering.
//! 3. Escrow rows are mutated only inside the same local transaction
//!    as their companion wallet transactions.

pub mod state;

pub use state::EscrowState;

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};

use crate::error::LedgerError;
use crate::types::TxnId;

/// One bounty's escrow record
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EscrowRecord {
    pub bounty_id: i64,
    pub poster_id: i64,
    pub hunter_id: Option<i64>,
    pub amount_cents: i64,
    #[serde(with = "state_serde")]
    pub state: EscrowState,
    pub hold_txn_id: TxnId,
    pub settlement_txn_id: Option<TxnId>,
    pub platform_fee_cents: i64,
    /// Millisecond timestamps
    pub created_at: i64,
    pub updated_at: i64,
}

mod state_serde {
    use super::EscrowState;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(state: &EscrowState, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(state.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<EscrowState, D::Error> {
        let s = String::deserialize(de)?;
        match s.as_str() {
            "HELD" => Ok(EscrowState::Held),
            "RELEASED" => Ok(EscrowState::Released),
            "REFUNDED" => Ok(EscrowState::Refunded),
            other => Err(serde::de::Error::custom(format!(
                "unknown escrow state: {}",
                other
            ))),
        }
    }
}

/// Insert a new escrow row in `HELD` state.
///
/// Returns false when a row for the bounty already exists (the caller
/// decides whether that is a safe replay or a conflict).
pub async fn insert_held(
    conn: &mut PgConnection,
    record: &EscrowRecord,
) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        r#"
        INSERT INTO escrows_tb
            (bounty_id, poster_id, hunter_id, amount_cents, state,
             hold_txn_id, platform_fee_cents, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
        ON CONFLICT (bounty_id) DO NOTHING
        "#,
    )
    .bind(record.bounty_id)
    .bind(record.poster_id)
    .bind(record.hunter_id)
    .bind(record.amount_cents)
    .bind(EscrowState::Held.id())
    .bind(record.hold_txn_id.to_string())
    .bind(record.platform_fee_cents)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Get an escrow row, locking it for the caller's transaction
pub async fn get_for_update(
    conn: &mut PgConnection,
    bounty_id: i64,
) -> Result<Option<EscrowRecord>, LedgerError> {
    let row = sqlx::query(
        r#"
        SELECT bounty_id, poster_id, hunter_id, amount_cents, state,
               hold_txn_id, settlement_txn_id, platform_fee_cents,
               created_at, updated_at
        FROM escrows_tb
        WHERE bounty_id = $1
        FOR UPDATE
        "#,
    )
    .bind(bounty_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(row_to_record(&row)?)),
        None => Ok(None),
    }
}

/// Plain point read (no lock)
pub async fn get(
    conn: &mut PgConnection,
    bounty_id: i64,
) -> Result<Option<EscrowRecord>, LedgerError> {
    let row = sqlx::query(
        r#"
        SELECT bounty_id, poster_id, hunter_id, amount_cents, state,
               hold_txn_id, settlement_txn_id, platform_fee_cents,
               created_at, updated_at
        FROM escrows_tb
        WHERE bounty_id = $1
        "#,
    )
    .bind(bounty_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(row_to_record(&row)?)),
        None => Ok(None),
    }
}

/// Atomic CAS transition `HELD -> new_state`, recording the settlement
/// transaction and (for releases) the platform fee.
///
/// Returns true if this call performed the transition.
pub async fn settle(
    conn: &mut PgConnection,
    bounty_id: i64,
    new_state: EscrowState,
    settlement_txn_id: TxnId,
    platform_fee_cents: i64,
) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        r#"
        UPDATE escrows_tb
        SET state = $1, settlement_txn_id = $2, platform_fee_cents = $3,
            updated_at = NOW()
        WHERE bounty_id = $4 AND state = $5
        "#,
    )
    .bind(new_state.id())
    .bind(settlement_txn_id.to_string())
    .bind(platform_fee_cents)
    .bind(bounty_id)
    .bind(EscrowState::Held.id())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn row_to_record(row: &PgRow) -> Result<EscrowRecord, LedgerError> {
    let state_id: i16 = row.get("state");
    let state = EscrowState::from_id(state_id)
        .ok_or_else(|| LedgerError::Internal(format!("Invalid escrow state ID: {}", state_id)))?;

    let hold_txn_id: TxnId = row
        .get::<String, _>("hold_txn_id")
        .parse()
        .map_err(|_| LedgerError::Internal("Invalid hold_txn_id format".to_string()))?;

    let settlement_txn_id = match row.get::<Option<String>, _>("settlement_txn_id") {
        Some(s) => Some(
            s.parse()
                .map_err(|_| LedgerError::Internal("Invalid settlement_txn_id format".to_string()))?,
        ),
        None => None,
    };

    let created_at: chrono::DateTime<chrono::Utc> = row.get("created_at");
    let updated_at: chrono::DateTime<chrono::Utc> = row.get("updated_at");

    Ok(EscrowRecord {
        bounty_id: row.get("bounty_id"),
        poster_id: row.get("poster_id"),
        hunter_id: row.get("hunter_id"),
        amount_cents: row.get("amount_cents"),
        state,
        hold_txn_id,
        settlement_txn_id,
        platform_fee_cents: row.get("platform_fee_cents"),
        created_at: created_at.timestamp_millis(),
        updated_at: updated_at.timestamp_millis(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_roundtrip() {
        let record = EscrowRecord {
            bounty_id: 42,
            poster_id: 1001,
            hunter_id: Some(2002),
            amount_cents: 5000,
            state: EscrowState::Held,
            hold_txn_id: TxnId::new(),
            settlement_txn_id: None,
            platform_fee_cents: 0,
            created_at: 0,
            updated_at: 0,
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"HELD\""));

        let back: EscrowRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bounty_id, 42);
        assert_eq!(back.state, EscrowState::Held);
        assert_eq!(back.hold_txn_id, record.hold_txn_id);
    }
}
