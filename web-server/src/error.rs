// web-server/src/error.rs
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;

use crate::oracle::OracleError;
use crate::store::StoreError;

/// Errors surfaced by the authentication and proof flows.
///
/// Verification failures are deliberately generic: malformed input, a bad
/// signature and an unknown user all read "could not verify wallet".
/// Conflicts and oracle failures are specific because the client reacts to
/// them differently.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("could not verify wallet")]
    VerificationFailed,

    #[error("no nonce available, restart the sign-in challenge")]
    NonceUnavailable,

    #[error("address is already verified by another user")]
    AddressClaimed,

    #[error("not authenticated")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid state: {0}")]
    InvalidTransition(String),

    #[error("confirmation oracle unavailable: {0}")]
    Oracle(#[from] OracleError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    fn code(&self) -> &'static str {
        match self {
            AuthError::VerificationFailed => "verification_failed",
            AuthError::NonceUnavailable => "restart_challenge",
            AuthError::AddressClaimed => "address_claimed",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::NotFound(_) => "not_found",
            AuthError::InvalidTransition(_) => "invalid_state",
            AuthError::Oracle(_) => "oracle_unavailable",
            AuthError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Internal(e.to_string())
    }
}

impl From<rusqlite::Error> for AuthError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::from(e).into()
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::VerificationFailed | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::NonceUnavailable | AuthError::AddressClaimed | AuthError::InvalidTransition(_) => {
                StatusCode::CONFLICT
            }
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Oracle(_) => StatusCode::BAD_GATEWAY,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AuthError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                json!({ "error": "Internal server error", "code": self.code() })
            }
            AuthError::Oracle(detail) => {
                tracing::warn!("Confirmation oracle error: {}", detail);
                json!({
                    "status": "error",
                    "error": "Transaction status is temporarily unavailable",
                    "code": self.code(),
                    "retryable": true
                })
            }
            other => json!({ "error": other.to_string(), "code": other.code() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
