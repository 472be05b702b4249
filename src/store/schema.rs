//! Schema bootstrap
//!
//! Idempotent DDL executed at startup. The partial unique index on
//! settled escrow-scoped transactions is the database-level
//! double-spend guard; it must exist before any traffic is accepted.

use sqlx::PgPool;

const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS wallet_accounts_tb (
    user_id         BIGINT PRIMARY KEY,
    balance_cents   BIGINT NOT NULL DEFAULT 0,
    version         BIGINT NOT NULL DEFAULT 0,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_TXNS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS wallet_txns_tb (
    txn_id          TEXT PRIMARY KEY,
    user_id         BIGINT NOT NULL,
    txn_type        SMALLINT NOT NULL,
    amount_cents    BIGINT NOT NULL,
    bounty_id       BIGINT,
    status          SMALLINT NOT NULL DEFAULT 0,
    external_ref    TEXT,
    idempotency_key TEXT NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// At most one completed escrow/release/refund row per bounty.
/// txn_type ids: escrow=30, release=40, refund=50; status completed=20.
const CREATE_SETTLED_GUARD_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS uq_txns_bounty_settled
    ON wallet_txns_tb (bounty_id, txn_type)
    WHERE status = 20 AND txn_type IN (30, 40, 50)
"#;

const CREATE_TXNS_USER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS ix_txns_user ON wallet_txns_tb (user_id, created_at)
"#;

const CREATE_ESCROWS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS escrows_tb (
    bounty_id           BIGINT PRIMARY KEY,
    poster_id           BIGINT NOT NULL,
    hunter_id           BIGINT,
    amount_cents        BIGINT NOT NULL,
    state               SMALLINT NOT NULL,
    hold_txn_id         TEXT NOT NULL,
    settlement_txn_id   TEXT,
    platform_fee_cents  BIGINT NOT NULL DEFAULT 0,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_OUTBOX_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS outbox_tb (
    id            BIGSERIAL PRIMARY KEY,
    event_type    SMALLINT NOT NULL,
    payload       TEXT NOT NULL,
    status        SMALLINT NOT NULL DEFAULT 0,
    retry_count   INT NOT NULL DEFAULT 0,
    next_retry_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    claimed_at    TIMESTAMPTZ,
    last_error    TEXT,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_OUTBOX_PENDING_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS ix_outbox_pending
    ON outbox_tb (next_retry_at) WHERE status = 0
"#;

const CREATE_IDEMPOTENCY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS idempotency_tb (
    key             TEXT PRIMARY KEY,
    scope           TEXT NOT NULL,
    status          SMALLINT NOT NULL DEFAULT 0,
    fingerprint     TEXT NOT NULL,
    result_snapshot TEXT,
    expires_at      TIMESTAMPTZ NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Create all ledger tables and indexes if they do not exist
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Initializing ledger schema...");

    for ddl in [
        CREATE_ACCOUNTS_TABLE,
        CREATE_TXNS_TABLE,
        CREATE_SETTLED_GUARD_INDEX,
        CREATE_TXNS_USER_INDEX,
        CREATE_ESCROWS_TABLE,
        CREATE_OUTBOX_TABLE,
        CREATE_OUTBOX_PENDING_INDEX,
        CREATE_IDEMPOTENCY_TABLE,
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::info!("Ledger schema ready");
    Ok(())
}
