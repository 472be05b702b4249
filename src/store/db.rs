//! Database connection management

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// The façade holds one connection per in-flight local transaction and
/// the outbox workers one each; ten covers both with headroom.
const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// PostgreSQL connection pool for the ledger store
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect and verify the server answers before accepting traffic
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await?;

        let db = Self { pool };
        db.health_check().await?;
        tracing::info!(
            max_connections = MAX_CONNECTIONS,
            "PostgreSQL connection pool established"
        );
        Ok(db)
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip query confirming the connection is usable
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
