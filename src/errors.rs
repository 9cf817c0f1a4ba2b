//! Error taxonomy shared by the ledger, matching engine, store and
//! coordinator, and its mapping onto HTTP responses for `api.rs`.
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use crate::{ledger::LedgerError, store::StoreError};

/// The coordinator's error taxonomy, per spec's error handling design.
///
/// Every variant here is surfaced to API clients except [`CoreError::Internal`],
/// which is logged with detail via `tracing::error!` and returned opaque.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("not found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,

    #[error("invalid state")]
    InvalidState,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("insufficient liquidity")]
    InsufficientLiquidity,

    #[error("conflict")]
    Conflict,

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl From<LedgerError> for CoreError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds => CoreError::InsufficientFunds,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            // A malformed or stale client-supplied pagination cursor is an
            // input-validation failure reachable with ordinary bad input
            // (e.g. `GET /public/transactions/{ticker}?after=...`), not an
            // "unclassified failure" (spec §7's definition of `INTERNAL`).
            StoreError::BadCursor => CoreError::InvalidState,
            other => CoreError::Internal(other.into()),
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg): (StatusCode, String) = match &self {
            CoreError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            CoreError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            CoreError::InvalidState => (StatusCode::BAD_REQUEST, self.to_string()),
            CoreError::InsufficientFunds => (StatusCode::BAD_REQUEST, self.to_string()),
            CoreError::InsufficientLiquidity => (StatusCode::BAD_REQUEST, self.to_string()),
            CoreError::Conflict => (StatusCode::CONFLICT, self.to_string()),
            CoreError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
            }
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}
