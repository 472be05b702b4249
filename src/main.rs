//! Ledger service entry point
//!
//! Startup order matters: config, logging, database + schema, then the
//! background workers, then the HTTP surface.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use bounty_ledger::api::{self, AppState};
use bounty_ledger::config::AppConfig;
use bounty_ledger::gateway::{HttpPaymentGateway, PaymentGateway};
use bounty_ledger::idempotency::IdempotencyStore;
use bounty_ledger::logging::init_logging;
use bounty_ledger::notify::{HttpNotifier, LogNotifier, Notifier};
use bounty_ledger::outbox::{OutboxDb, OutboxWorker, WorkerConfig};
use bounty_ledger::service::LedgerService;
use bounty_ledger::store::{Database, init_schema};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("LEDGER_ENV").unwrap_or_else(|_| "dev".to_string());
    let config = AppConfig::load(&env);
    let _log_guard = init_logging(&config);

    info!(env = %env, "Starting bounty ledger service");

    let database_url = config
        .postgres_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .context("postgres_url not configured and DATABASE_URL unset")?;

    let db = Database::connect(&database_url).await?;
    init_schema(db.pool()).await?;

    let gateway: Arc<dyn PaymentGateway> = build_gateway(&config)?;
    let notifier: Arc<dyn Notifier> = if config.notifier.webhook_url.is_empty() {
        Arc::new(LogNotifier)
    } else {
        Arc::new(HttpNotifier::new(config.notifier.webhook_url.clone())?)
    };

    // Outbox workers: any number may run; the claim query coordinates them
    let worker_config = WorkerConfig::from(&config.outbox);
    for i in 0..config.outbox.workers.max(1) {
        let worker = OutboxWorker::new(
            db.pool().clone(),
            gateway.clone(),
            notifier.clone(),
            worker_config.clone(),
        );
        tokio::spawn(async move {
            info!(worker = i, "Outbox worker started");
            worker.run().await
        });
    }

    // Idempotency registry sweeper
    let sweeper = IdempotencyStore::new(db.pool().clone());
    let sweep_interval = std::time::Duration::from_secs(config.idempotency.sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = sweeper.sweep_expired().await {
                tracing::warn!(error = %e, "Idempotency sweep failed");
            }
        }
    });

    let state = Arc::new(AppState {
        service: LedgerService::new(
            db.pool().clone(),
            config.idempotency.clone(),
            notifier.clone(),
        ),
        outbox: OutboxDb::new(db.pool().clone()),
    });

    let addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, "API listening");

    axum::serve(listener, api::router(state)).await?;
    Ok(())
}

fn build_gateway(config: &AppConfig) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    #[cfg(feature = "mock-gateway")]
    if config.provider.use_mock {
        info!("Using in-process mock payment gateway (dev/test only)");
        return Ok(Arc::new(bounty_ledger::gateway::MockPaymentGateway::new()));
    }

    info!(base_url = %config.provider.base_url, "Using HTTP payment gateway");
    Ok(Arc::new(HttpPaymentGateway::new(&config.provider)?))
}
