// src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("malformed transaction meta: {0}")]
    MalformedTransactionMeta(String),

    /// Recovered locally by the labeler, never returned to callers
    #[error("lookup failed for {address}: {reason}")]
    LookupFailure { address: String, reason: String },

    #[error("owner of token account {0} could not be resolved")]
    OwnerUnresolved(String),

    #[error("completion stream fault: {0}")]
    UpstreamStreamFault(String),

    #[error("completion service is not configured")]
    CompletionDisabled,

    #[error("transaction {0} not found")]
    TransactionNotFound(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ExplainError>;

impl ExplainError {
    fn status(&self) -> StatusCode {
        match self {
            ExplainError::TransactionNotFound(_) => StatusCode::NOT_FOUND,
            ExplainError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            ExplainError::MalformedTransactionMeta(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ExplainError::UpstreamStreamFault(_) | ExplainError::Rpc(_) => StatusCode::BAD_GATEWAY,
            ExplainError::CompletionDisabled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ExplainError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrBody {
            error: String,
        }

        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("internal error: {self:#}");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrBody { error: message })).into_response()
    }
}
