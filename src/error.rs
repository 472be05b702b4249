//! Ledger Error Types
//!
//! One error enum for the whole façade so callers are forced to
//! distinguish conflicts from business-rule rejections.

use thiserror::Error;

/// Ledger error taxonomy
///
/// Error codes are stable strings for API responses and logs.
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    // === Validation Errors (rejected before any write) ===
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Platform fee exceeds escrow amount")]
    FeeExceedsAmount,

    #[error("Missing idempotency key")]
    MissingIdempotencyKey,

    // === Conflict Errors (rejected, never retried) ===
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bounty already has an escrow")]
    AlreadyEscrowed,

    #[error("Idempotency key reused with different parameters")]
    KeyParameterMismatch,

    #[error("Operation with this idempotency key is still in progress")]
    InProgress,

    // === Business Rules ===
    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Escrow not found for bounty {0}")]
    EscrowNotFound(i64),

    #[error("Invalid escrow state: expected {expected}, found {found}")]
    InvalidState { expected: String, found: String },

    #[error("Escrow hold is not yet confirmed by the payment provider")]
    HoldUnconfirmed,

    // === Internal (retriable by the caller layer) ===
    #[error("Balance update contention exhausted retries")]
    ConcurrencyExhausted,

    // === System Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal system error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "INVALID_REQUEST",
            LedgerError::InvalidAmount => "INVALID_AMOUNT",
            LedgerError::FeeExceedsAmount => "FEE_EXCEEDS_AMOUNT",
            LedgerError::MissingIdempotencyKey => "MISSING_IDEMPOTENCY_KEY",
            LedgerError::Conflict(_) => "CONFLICT",
            LedgerError::AlreadyEscrowed => "ALREADY_ESCROWED",
            LedgerError::KeyParameterMismatch => "KEY_PARAMETER_MISMATCH",
            LedgerError::InProgress => "OPERATION_IN_PROGRESS",
            LedgerError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            LedgerError::EscrowNotFound(_) => "ESCROW_NOT_FOUND",
            LedgerError::InvalidState { .. } => "INVALID_STATE",
            LedgerError::HoldUnconfirmed => "HOLD_UNCONFIRMED",
            LedgerError::ConcurrencyExhausted => "CONCURRENCY_EXHAUSTED",
            LedgerError::Database(_) => "DATABASE_ERROR",
            LedgerError::Internal(_) => "SYSTEM_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::Validation(_)
            | LedgerError::InvalidAmount
            | LedgerError::FeeExceedsAmount
            | LedgerError::MissingIdempotencyKey => 400,
            LedgerError::EscrowNotFound(_) => 404,
            LedgerError::Conflict(_)
            | LedgerError::AlreadyEscrowed
            | LedgerError::KeyParameterMismatch
            | LedgerError::InProgress
            | LedgerError::InvalidState { .. }
            | LedgerError::HoldUnconfirmed => 409,
            LedgerError::InsufficientBalance => 422,
            LedgerError::ConcurrencyExhausted => 503,
            LedgerError::Database(_) | LedgerError::Internal(_) => 500,
        }
    }

    /// Whether the caller may safely retry the same request
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            LedgerError::InProgress
                | LedgerError::HoldUnconfirmed
                | LedgerError::ConcurrencyExhausted
                | LedgerError::Database(_)
        )
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Database(e.to_string())
    }
}

impl From<anyhow::Error> for LedgerError {
    fn from(e: anyhow::Error) -> Self {
        LedgerError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Internal(format!("payload encoding: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LedgerError::InsufficientBalance.code(),
            "INSUFFICIENT_BALANCE"
        );
        assert_eq!(LedgerError::AlreadyEscrowed.code(), "ALREADY_ESCROWED");
        assert_eq!(
            LedgerError::ConcurrencyExhausted.code(),
            "CONCURRENCY_EXHAUSTED"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(LedgerError::InvalidAmount.http_status(), 400);
        assert_eq!(LedgerError::EscrowNotFound(7).http_status(), 404);
        assert_eq!(LedgerError::AlreadyEscrowed.http_status(), 409);
        assert_eq!(LedgerError::InsufficientBalance.http_status(), 422);
        assert_eq!(LedgerError::Database("x".into()).http_status(), 500);
        assert_eq!(LedgerError::ConcurrencyExhausted.http_status(), 503);
    }

    #[test]
    fn test_retriable() {
        assert!(LedgerError::InProgress.is_retriable());
        assert!(LedgerError::ConcurrencyExhausted.is_retriable());
        assert!(!LedgerError::AlreadyEscrowed.is_retriable());
        assert!(!LedgerError::InsufficientBalance.is_retriable());
    }

    #[test]
    fn test_display() {
        let err = LedgerError::InvalidState {
            expected: "HELD".into(),
            found: "RELEASED".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid escrow state: expected HELD, found RELEASED"
        );
    }
}
