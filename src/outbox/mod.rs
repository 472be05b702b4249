//! Transactional Outbox
//!
//! Decouples "decide to act" (fast, local, transactional) from "act on
//! the external provider" (slow, unreliable). Intent is written to
//! `outbox_tb` in the same database transaction as the ledger rows it
//! belongs to; the worker then drives each event to `DONE` or `FAILED`
//! with retry/backoff and poison-message quarantine.
//!
//! # Safety Invariants
//!
//! 1. **Atomic enqueue**: an event exists iff its companion ledger rows
//!    exist.
//! 2. **Single claimer**: the claim query marks `PROCESSING` under
//!    `FOR UPDATE SKIP LOCKED`; crashed claims expire via lease.
//! 3. **Deterministic idempotency tokens**: retries present the same
//!    token to the provider, so duplicated outbound calls cannot move
//!    money twice.
//! 4. **No silent drops**: exhausted or permanently-failed events stay
//!    in the table as `FAILED`.

pub mod db;
pub mod types;
pub mod worker;

pub use db::{OutboxDb, enqueue};
pub use types::{EventPayload, EventStatus, EventType, OutboxEvent};
pub use worker::{OutboxWorker, WorkerConfig};
