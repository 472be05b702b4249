//! HTTP API Layer
//!
//! Thin axum router over the ledger service façade. This is the
//! synchronous contract the bounty lifecycle service calls; every
//! money-moving endpoint requires a caller-supplied idempotency key in
//! the request body. Authentication is handled upstream.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::error::LedgerError;
use crate::outbox::OutboxDb;
use crate::service::{
    CreateEscrowRequest, DepositRequest, LedgerService, ProviderWebhook, RefundEscrowRequest,
    ReleaseEscrowRequest, WithdrawRequest,
};

/// Unified API response wrapper
///
/// code 0 = success; non-zero codes carry the ledger error code string
/// in `msg`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }
}

pub struct AppState {
    pub service: LedgerService,
    pub outbox: OutboxDb,
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

fn reject<T>(err: LedgerError) -> ApiResult<T> {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    tracing::debug!(code = err.code(), error = %err, "Request rejected");
    Err((
        status,
        Json(ApiResponse {
            code: 1,
            msg: format!("{}: {}", err.code(), err),
            data: None,
        }),
    ))
}

fn respond<T>(result: Result<T, LedgerError>) -> ApiResult<T> {
    match result {
        Ok(data) => Ok(Json(ApiResponse::success(data))),
        Err(err) => reject(err),
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/escrows", post(create_escrow))
        .route("/api/v1/escrows/{bounty_id}", get(get_escrow))
        .route("/api/v1/escrows/{bounty_id}/release", post(release_escrow))
        .route("/api/v1/escrows/{bounty_id}/refund", post(refund_escrow))
        .route("/api/v1/wallet/deposit", post(deposit))
        .route("/api/v1/wallet/withdraw", post(withdraw))
        .route("/api/v1/wallet/{user_id}/balance", get(get_balance))
        .route("/api/v1/webhooks/payment", post(payment_webhook))
        .route("/api/v1/admin/outbox/failed", get(failed_events))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn create_escrow(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateEscrowRequest>,
) -> ApiResult<crate::escrow::EscrowRecord> {
    respond(state.service.create_escrow(req).await)
}

async fn get_escrow(
    State(state): State<Arc<AppState>>,
    Path(bounty_id): Path<i64>,
) -> ApiResult<crate::escrow::EscrowRecord> {
    match state.service.get_escrow(bounty_id).await {
        Ok(Some(record)) => Ok(Json(ApiResponse::success(record))),
        Ok(None) => reject(LedgerError::EscrowNotFound(bounty_id)),
        Err(err) => reject(err),
    }
}

async fn release_escrow(
    State(state): State<Arc<AppState>>,
    Path(bounty_id): Path<i64>,
    Json(mut req): Json<ReleaseEscrowRequest>,
) -> ApiResult<crate::types::WalletTransaction> {
    req.bounty_id = bounty_id;
    respond(state.service.release_escrow(req).await)
}

async fn refund_escrow(
    State(state): State<Arc<AppState>>,
    Path(bounty_id): Path<i64>,
    Json(mut req): Json<RefundEscrowRequest>,
) -> ApiResult<crate::types::WalletTransaction> {
    req.bounty_id = bounty_id;
    respond(state.service.refund_escrow(req).await)
}

async fn deposit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DepositRequest>,
) -> ApiResult<crate::types::WalletTransaction> {
    respond(state.service.deposit(req).await)
}

async fn withdraw(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WithdrawRequest>,
) -> ApiResult<crate::types::WalletTransaction> {
    respond(state.service.withdraw(req).await)
}

async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> ApiResult<crate::types::WalletAccount> {
    respond(state.service.get_balance(user_id).await)
}

async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    Json(hook): Json<ProviderWebhook>,
) -> ApiResult<crate::service::WebhookOutcome> {
    respond(state.service.process_webhook(hook).await)
}

/// Operator dashboard: quarantined outbox events
#[derive(Debug, Serialize)]
pub struct FailedEventView {
    pub id: i64,
    pub event_type: String,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: i64,
}

async fn failed_events(State(state): State<Arc<AppState>>) -> ApiResult<Vec<FailedEventView>> {
    match state.outbox.list_failed(100).await {
        Ok(events) => Ok(Json(ApiResponse::success(
            events
                .into_iter()
                .map(|e| FailedEventView {
                    id: e.id,
                    event_type: e.event_type.as_str().to_string(),
                    retry_count: e.retry_count,
                    last_error: e.last_error,
                    created_at: e.created_at,
                })
                .collect(),
        ))),
        Err(err) => reject(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_envelope() {
        let ok = ApiResponse::success(42);
        let json = serde_json::to_string(&ok).unwrap();
        assert_eq!(json, r#"{"code":0,"msg":"ok","data":42}"#);

        let err: ApiResponse<()> = ApiResponse {
            code: 1,
            msg: "INSUFFICIENT_BALANCE: Insufficient balance".to_string(),
            data: None,
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(!json.contains("data"));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            StatusCode::from_u16(LedgerError::InsufficientBalance.http_status()).unwrap(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            StatusCode::from_u16(LedgerError::AlreadyEscrowed.http_status()).unwrap(),
            StatusCode::CONFLICT
        );
    }
}
