//! Error responses of the facilitator service.
//!
//! Invalid payments and failed settlements are answered with 200 and a
//! verdict body; only requests that get no verdict end up here.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use x402_core::facilitator::FacilitatorError;
use x402_core::settle::SettlementFault;

/// A request the facilitator could not answer with a verdict.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The body is not a well-formed request.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    /// Verification or settlement could not run.
    #[error(transparent)]
    Facilitator(#[from] FacilitatorError),
}

impl ServiceError {
    /// Status code this error is answered with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody(_) | Self::Facilitator(FacilitatorError::UnsupportedVersion(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Facilitator(FacilitatorError::Settlement(SettlementFault::ChainUnavailable(
                _,
            ))) => StatusCode::BAD_GATEWAY,
            Self::Facilitator(
                FacilitatorError::Settlement(SettlementFault::NoChainClient(_))
                | FacilitatorError::Transport(_),
            ) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request refused");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
