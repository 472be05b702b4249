//! Outbox Persistence Layer
//!
//! The claim query is the single-claimer guarantee: it selects one due
//! row with `FOR UPDATE SKIP LOCKED` and flips it to `PROCESSING` in
//! the same statement, so any number of worker instances can poll the
//! same table without double-processing. Rows stuck in `PROCESSING`
//! longer than the lease belong to a crashed worker and become
//! claimable again.

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};

use super::types::{EventPayload, EventStatus, EventType, OutboxEvent};
use crate::error::LedgerError;

/// Enqueue an event on the caller's connection so it commits atomically
/// with the companion ledger rows. Returns the new event id.
pub async fn enqueue(conn: &mut PgConnection, payload: &EventPayload) -> Result<i64, LedgerError> {
    let body = serde_json::to_string(payload)?;

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO outbox_tb (event_type, payload, status, next_retry_at)
        VALUES ($1, $2, $3, NOW())
        RETURNING id
        "#,
    )
    .bind(payload.event_type().id())
    .bind(body)
    .bind(EventStatus::Pending.id())
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

/// Mark an event done on the caller's connection (joins the success
/// finalization transaction).
pub async fn mark_done(conn: &mut PgConnection, event_id: i64) -> Result<(), LedgerError> {
    sqlx::query("UPDATE outbox_tb SET status = $1, updated_at = NOW() WHERE id = $2")
        .bind(EventStatus::Done.id())
        .bind(event_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Mark an event failed on the caller's connection (joins the
/// permanent-failure transaction that also fails the companion txns).
pub async fn mark_failed(
    conn: &mut PgConnection,
    event_id: i64,
    error: &str,
) -> Result<(), LedgerError> {
    sqlx::query(
        "UPDATE outbox_tb SET status = $1, last_error = $2, updated_at = NOW() WHERE id = $3",
    )
    .bind(EventStatus::Failed.id())
    .bind(error)
    .bind(event_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Pool-level outbox operations
pub struct OutboxDb {
    pool: PgPool,
}

impl OutboxDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Claim the oldest due event, atomically marking it `PROCESSING`.
    ///
    /// Due = `PENDING` with `next_retry_at` in the past, or
    /// `PROCESSING` with an expired claim lease.
    pub async fn claim_next(&self, lease_secs: u64) -> Result<Option<OutboxEvent>, LedgerError> {
        let row = sqlx::query(
            r#"
            UPDATE outbox_tb
            SET status = $1, claimed_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM outbox_tb
                WHERE (status = $2 AND next_retry_at <= NOW())
                   OR (status = $1 AND claimed_at < NOW() - INTERVAL '1 second' * $3)
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, event_type, payload, status, retry_count, last_error,
                      created_at, updated_at
            "#,
        )
        .bind(EventStatus::Processing.id())
        .bind(EventStatus::Pending.id())
        .bind(lease_secs as i64)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_event(&row)?)),
            None => Ok(None),
        }
    }

    /// Put a transiently-failed event back in the queue with backoff
    pub async fn reschedule(
        &self,
        event_id: i64,
        delay_secs: u64,
        error: &str,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            UPDATE outbox_tb
            SET status = $1, retry_count = retry_count + 1,
                next_retry_at = NOW() + INTERVAL '1 second' * $2,
                last_error = $3, updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(EventStatus::Pending.id())
        .bind(delay_secs as i64)
        .bind(error)
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Park a poison event for operator review. Never deletes.
    pub async fn quarantine(&self, event_id: i64, error: &str) -> Result<(), LedgerError> {
        sqlx::query(
            "UPDATE outbox_tb SET status = $1, last_error = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(EventStatus::Failed.id())
        .bind(error)
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get one event by id
    pub async fn get(&self, event_id: i64) -> Result<Option<OutboxEvent>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT id, event_type, payload, status, retry_count, last_error,
                   created_at, updated_at
            FROM outbox_tb
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_event(&row)?)),
            None => Ok(None),
        }
    }

    /// Quarantined events for the operator dashboard
    pub async fn list_failed(&self, limit: i64) -> Result<Vec<OutboxEvent>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, payload, status, retry_count, last_error,
                   created_at, updated_at
            FROM outbox_tb
            WHERE status = $1
            ORDER BY updated_at DESC
            LIMIT $2
            "#,
        )
        .bind(EventStatus::Failed.id())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            events.push(row_to_event(&row)?);
        }
        Ok(events)
    }

    /// Number of events not yet in a terminal state
    pub async fn backlog(&self) -> Result<i64, LedgerError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outbox_tb WHERE status IN ($1, $2)")
                .bind(EventStatus::Pending.id())
                .bind(EventStatus::Processing.id())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

fn row_to_event(row: &PgRow) -> Result<OutboxEvent, LedgerError> {
    let type_id: i16 = row.get("event_type");
    let event_type = EventType::from_id(type_id)
        .ok_or_else(|| LedgerError::Internal(format!("Invalid event_type: {}", type_id)))?;

    let status_id: i16 = row.get("status");
    let status = EventStatus::from_id(status_id)
        .ok_or_else(|| LedgerError::Internal(format!("Invalid event status: {}", status_id)))?;

    let created_at: chrono::DateTime<chrono::Utc> = row.get("created_at");
    let updated_at: chrono::DateTime<chrono::Utc> = row.get("updated_at");

    Ok(OutboxEvent {
        id: row.get("id"),
        event_type,
        payload: row.get("payload"),
        status,
        retry_count: row.get("retry_count"),
        last_error: row.get("last_error"),
        created_at: created_at.timestamp_millis(),
        updated_at: updated_at.timestamp_millis(),
    })
}
