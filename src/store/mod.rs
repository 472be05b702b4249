//! Ledger Store
//!
//! Durable, transactional persistence for wallet accounts and the
//! append-only transaction log.
//!
//! The balance is a running projection over completed transactions,
//! maintained with optimistic concurrency (version counter), never
//! recomputed by summing in the hot path. `recompute_balance` exists
//! for reconciliation and tests only.

pub mod db;
pub mod ledger;
pub mod schema;

pub use db::Database;
pub use ledger::{LedgerStore, SettleOutcome};
pub use schema::init_schema;
