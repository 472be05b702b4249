//! Core Ledger Types
//!
//! Transaction and account shapes shared across the store, the façade
//! and the outbox worker. Numeric enum ids are designed for PostgreSQL
//! storage as SMALLINT.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The reserved wallet account that collects platform fees.
pub const PLATFORM_ACCOUNT_ID: i64 = 0;

/// Wallet transaction id - ULID-based unique identifier
///
/// ULIDs are monotonic and sortable, and need no coordination between
/// service instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnId(ulid::Ulid);

impl TxnId {
    /// Generate a new unique TxnId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for TxnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TxnId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for TxnId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TxnId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Wallet transaction type
///
/// Escrow and withdrawal rows carry negative amounts (debit from the
/// payer's perspective); deposit, release, refund and platform_fee rows
/// carry positive amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum TxnType {
    Deposit = 10,
    Withdrawal = 20,
    Escrow = 30,
    Release = 40,
    Refund = 50,
    PlatformFee = 60,
}

impl TxnType {
    /// Get numeric ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            10 => Some(TxnType::Deposit),
            20 => Some(TxnType::Withdrawal),
            30 => Some(TxnType::Escrow),
            40 => Some(TxnType::Release),
            50 => Some(TxnType::Refund),
            60 => Some(TxnType::PlatformFee),
            _ => None,
        }
    }

    /// Get human-readable type name
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnType::Deposit => "DEPOSIT",
            TxnType::Withdrawal => "WITHDRAWAL",
            TxnType::Escrow => "ESCROW",
            TxnType::Release => "RELEASE",
            TxnType::Refund => "REFUND",
            TxnType::PlatformFee => "PLATFORM_FEE",
        }
    }

    /// Types that settle a bounty's escrow (at most one completed row
    /// per bounty across these, enforced by a partial unique index).
    #[inline]
    pub fn is_escrow_scoped(&self) -> bool {
        matches!(self, TxnType::Escrow | TxnType::Release | TxnType::Refund)
    }
}

impl fmt::Display for TxnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Wallet transaction status
///
/// Rows are created `Pending` in the same local transaction as their
/// outbox event and moved to `Completed`/`Failed` only after the
/// external call resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum TxnStatus {
    Pending = 0,
    Completed = 20,
    Failed = -10,
}

impl TxnStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TxnStatus::Pending),
            20 => Some(TxnStatus::Completed),
            -10 => Some(TxnStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxnStatus::Pending => "PENDING",
            TxnStatus::Completed => "COMPLETED",
            TxnStatus::Failed => "FAILED",
        }
    }

    /// Only completed rows contribute to the balance projection.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxnStatus::Completed | TxnStatus::Failed)
    }
}

impl fmt::Display for TxnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single row of the append-only wallet transaction log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub txn_id: TxnId,
    pub user_id: i64,
    pub txn_type: TxnType,
    /// Signed amount in cents
    pub amount_cents: i64,
    /// Set for escrow-scoped rows
    pub bounty_id: Option<i64>,
    pub status: TxnStatus,
    /// Provider charge/transfer/refund id, stamped once confirmed
    pub external_ref: Option<String>,
    pub idempotency_key: String,
    /// Millisecond timestamps
    pub created_at: i64,
    pub updated_at: i64,
}

impl WalletTransaction {
    /// Create a new pending transaction row
    pub fn pending(
        user_id: i64,
        txn_type: TxnType,
        amount_cents: i64,
        bounty_id: Option<i64>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            txn_id: TxnId::new(),
            user_id,
            txn_type,
            amount_cents,
            bounty_id,
            status: TxnStatus::Pending,
            external_ref: None,
            idempotency_key: idempotency_key.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl fmt::Display for WalletTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Txn[{}] {} user={} amount={} status={}",
            self.txn_id, self.txn_type, self.user_id, self.amount_cents, self.status
        )
    }
}

/// Current-balance projection for one user
///
/// `balance_cents` equals the sum of all completed transaction amounts
/// for the user; `version` is the optimistic-concurrency counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WalletAccount {
    pub user_id: i64,
    pub balance_cents: i64,
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txn_type_roundtrip() {
        for t in [
            TxnType::Deposit,
            TxnType::Withdrawal,
            TxnType::Escrow,
            TxnType::Release,
            TxnType::Refund,
            TxnType::PlatformFee,
        ] {
            assert_eq!(TxnType::from_id(t.id()), Some(t));
        }
        assert_eq!(TxnType::from_id(0), None);
        assert_eq!(TxnType::from_id(99), None);
    }

    #[test]
    fn test_txn_status_roundtrip() {
        for s in [TxnStatus::Pending, TxnStatus::Completed, TxnStatus::Failed] {
            assert_eq!(TxnStatus::from_id(s.id()), Some(s));
        }
        assert_eq!(TxnStatus::from_id(1), None);
    }

    #[test]
    fn test_escrow_scoped_types() {
        assert!(TxnType::Escrow.is_escrow_scoped());
        assert!(TxnType::Release.is_escrow_scoped());
        assert!(TxnType::Refund.is_escrow_scoped());
        assert!(!TxnType::Deposit.is_escrow_scoped());
        assert!(!TxnType::PlatformFee.is_escrow_scoped());
    }

    #[test]
    fn test_txn_id_roundtrip() {
        let id = TxnId::new();
        let parsed: TxnId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_pending_transaction() {
        let txn = WalletTransaction::pending(1001, TxnType::Escrow, -5000, Some(42), "key-1");
        assert_eq!(txn.status, TxnStatus::Pending);
        assert_eq!(txn.amount_cents, -5000);
        assert_eq!(txn.bounty_id, Some(42));
        assert!(txn.external_ref.is_none());
    }
}
