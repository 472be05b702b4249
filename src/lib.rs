//! Bounty Ledger - Escrow & Wallet Service
//!
//! Holds a poster's funds while bounty work is in progress, releases
//! them to the hunter (minus platform fee) on completion, or refunds
//! them on cancellation, with exactly-once application of money-moving
//! effects against an external payment provider.
//!
//! # Modules
//!
//! - [`types`] - Core transaction/account types (TxnId, TxnType, ...)
//! - [`error`] - `LedgerError` taxonomy
//! - [`store`] - PostgreSQL persistence and balance projection
//! - [`idempotency`] - Durable key -> result registry
//! - [`escrow`] - Per-bounty hold/release/refund state machine
//! - [`gateway`] - Payment provider adapter (HTTP + mock)
//! - [`outbox`] - Transactional outbox and its worker
//! - [`service`] - Ledger service façade
//! - [`notify`] - Notification fan-out (best-effort)
//! - [`api`] - axum HTTP surface

pub mod api;
pub mod config;
pub mod error;
pub mod escrow;
pub mod gateway;
pub mod idempotency;
pub mod logging;
pub mod notify;
pub mod outbox;
pub mod service;
pub mod store;
pub mod types;

// Convenient re-exports at crate root
pub use error::LedgerError;
pub use escrow::{EscrowRecord, EscrowState};
pub use gateway::{GatewayError, PaymentGateway};
pub use outbox::{EventPayload, EventStatus, EventType, OutboxWorker, WorkerConfig};
pub use service::LedgerService;
pub use store::{Database, LedgerStore, init_schema};
pub use types::{
    PLATFORM_ACCOUNT_ID, TxnId, TxnStatus, TxnType, WalletAccount, WalletTransaction,
};
