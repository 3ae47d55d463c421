//! Axum route handlers for the facilitator service.
//!
//! Request bodies are [`FacilitatorRequest`]s; verdicts are answered with
//! 200 whether the payment is valid or not.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use x402_core::facilitator::Facilitator;
use x402_core::proto::{FacilitatorRequest, SettlementResult, SupportedResponse, VerificationResult};

use crate::error::ServiceError;

/// Shared application state for the facilitator service.
pub type FacilitatorState = Arc<dyn Facilitator>;

/// `GET /supported` - the (version, scheme, network) kinds handled.
///
/// # Errors
///
/// Only if the underlying facilitator is remote and unreachable.
pub async fn get_supported(
    State(facilitator): State<FacilitatorState>,
) -> Result<Json<SupportedResponse>, ServiceError> {
    Ok(Json(facilitator.supported().await?))
}

/// `POST /verify` - verifies a payment without touching the chain.
///
/// # Errors
///
/// 400 for malformed bodies and unsupported versions.
pub async fn post_verify(
    State(facilitator): State<FacilitatorState>,
    body: Result<Json<FacilitatorRequest>, JsonRejection>,
) -> Result<Json<VerificationResult>, ServiceError> {
    let Json(request) = body?;
    let verdict = facilitator.verify(&request).await?;
    tracing::debug!(valid = verdict.is_valid(), network = %request.requirements.network, "verify");
    Ok(Json(verdict))
}

/// `POST /settle` - verifies, then settles a payment on-chain.
///
/// # Errors
///
/// 400 for malformed bodies and unsupported versions, 502 when the chain
/// cannot be reached, 500 when the network has no settlement client.
pub async fn post_settle(
    State(facilitator): State<FacilitatorState>,
    body: Result<Json<FacilitatorRequest>, JsonRejection>,
) -> Result<Json<SettlementResult>, ServiceError> {
    let Json(request) = body?;
    let settlement = facilitator.settle(&request).await?;
    tracing::info!(
        success = settlement.is_success(),
        network = %request.requirements.network,
        "settle"
    );
    Ok(Json(settlement))
}

/// `GET /health` - liveness check.
pub async fn get_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Creates an Axum [`axum::Router`] with all facilitator endpoints.
///
/// Endpoints:
/// - `GET /supported` - list supported payment kinds
/// - `POST /verify` - verify a payment
/// - `POST /settle` - settle a payment
/// - `GET /health` - liveness
pub fn facilitator_router(state: FacilitatorState) -> axum::Router {
    axum::Router::new()
        .route("/supported", get(get_supported))
        .route("/verify", post(post_verify))
        .route("/settle", post(post_settle))
        .route("/health", get(get_health))
        .with_state(state)
}
