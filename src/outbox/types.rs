//! Outbox Event Types
//!
//! Payloads are tagged variants dispatched through a typed match in the
//! worker, never runtime string matching on event names.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::TxnId;

/// Outbox event type ids (PostgreSQL SMALLINT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum EventType {
    EscrowHold = 10,
    EscrowRelease = 20,
    EscrowRefund = 30,
    DepositConfirm = 40,
    WithdrawalTransfer = 50,
}

impl EventType {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            10 => Some(EventType::EscrowHold),
            20 => Some(EventType::EscrowRelease),
            30 => Some(EventType::EscrowRefund),
            40 => Some(EventType::DepositConfirm),
            50 => Some(EventType::WithdrawalTransfer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::EscrowHold => "ESCROW_HOLD",
            EventType::EscrowRelease => "ESCROW_RELEASE",
            EventType::EscrowRefund => "ESCROW_REFUND",
            EventType::DepositConfirm => "DEPOSIT_CONFIRM",
            EventType::WithdrawalTransfer => "WITHDRAWAL_TRANSFER",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outbox event status
///
/// Exactly one worker may hold `Processing` on a row at a time; the
/// claim query enforces this with row locking, not application mutexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum EventStatus {
    Pending = 0,
    Processing = 10,
    Done = 20,
    /// Terminal: exceeded the retry ceiling or failed permanently.
    /// Kept forever for the audit trail; operator resolution required.
    Failed = -10,
}

impl EventStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(EventStatus::Pending),
            10 => Some(EventStatus::Processing),
            20 => Some(EventStatus::Done),
            -10 => Some(EventStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "PENDING",
            EventStatus::Processing => "PROCESSING",
            EventStatus::Done => "DONE",
            EventStatus::Failed => "FAILED",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Done | EventStatus::Failed)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters needed to replay the external call for one event.
///
/// Serialized as JSON into `outbox_tb.payload`; the JSON shape is an
/// implementation detail, not a public contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    EscrowHold {
        bounty_id: i64,
        poster_id: i64,
        amount_cents: i64,
        hold_txn_id: TxnId,
    },
    EscrowRelease {
        bounty_id: i64,
        hunter_id: i64,
        amount_cents: i64,
        platform_fee_cents: i64,
        release_txn_id: TxnId,
        fee_txn_id: Option<TxnId>,
        /// Provider authorization ref of the confirmed hold
        hold_ref: String,
    },
    EscrowRefund {
        bounty_id: i64,
        poster_id: i64,
        amount_cents: i64,
        refund_txn_id: TxnId,
        hold_ref: String,
    },
    DepositConfirm {
        user_id: i64,
        amount_cents: i64,
        deposit_txn_id: TxnId,
        /// Provider charge ref supplied by the client/webhook
        provider_ref: String,
    },
    WithdrawalTransfer {
        user_id: i64,
        amount_cents: i64,
        withdrawal_txn_id: TxnId,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::EscrowHold { .. } => EventType::EscrowHold,
            EventPayload::EscrowRelease { .. } => EventType::EscrowRelease,
            EventPayload::EscrowRefund { .. } => EventType::EscrowRefund,
            EventPayload::DepositConfirm { .. } => EventType::DepositConfirm,
            EventPayload::WithdrawalTransfer { .. } => EventType::WithdrawalTransfer,
        }
    }
}

/// One durable outbox row
#[derive(Debug, Clone)]
pub struct OutboxEvent {
    pub id: i64,
    pub event_type: EventType,
    pub payload: String,
    pub status: EventStatus,
    pub retry_count: i32,
    pub last_error: Option<String>,
    /// Millisecond timestamps
    pub created_at: i64,
    pub updated_at: i64,
}

impl fmt::Display for OutboxEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Outbox[{}] {} status={} retries={}",
            self.id, self.event_type, self.status, self.retry_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_roundtrip() {
        for t in [
            EventType::EscrowHold,
            EventType::EscrowRelease,
            EventType::EscrowRefund,
            EventType::DepositConfirm,
            EventType::WithdrawalTransfer,
        ] {
            assert_eq!(EventType::from_id(t.id()), Some(t));
        }
        assert_eq!(EventType::from_id(0), None);
    }

    #[test]
    fn test_event_status_terminal() {
        assert!(EventStatus::Done.is_terminal());
        assert!(EventStatus::Failed.is_terminal());
        assert!(!EventStatus::Pending.is_terminal());
        assert!(!EventStatus::Processing.is_terminal());
    }

    #[test]
    fn test_payload_json_roundtrip() {
        let payload = EventPayload::EscrowRelease {
            bounty_id: 1,
            hunter_id: 2002,
            amount_cents: 3000,
            platform_fee_cents: 150,
            release_txn_id: TxnId::new(),
            fee_txn_id: Some(TxnId::new()),
            hold_ref: "auth_abc".to_string(),
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"escrow_release\""));

        let back: EventPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), EventType::EscrowRelease);
        match back {
            EventPayload::EscrowRelease {
                platform_fee_cents, ..
            } => assert_eq!(platform_fee_cents, 150),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_payload_event_types() {
        let hold = EventPayload::EscrowHold {
            bounty_id: 1,
            poster_id: 1,
            amount_cents: 1,
            hold_txn_id: TxnId::new(),
        };
        assert_eq!(hold.event_type(), EventType::EscrowHold);
    }
}
