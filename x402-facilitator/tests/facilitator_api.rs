//! End-to-end tests of the facilitator router with a real EVM scheme and an
//! in-memory chain.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use x402_core::facilitator::LocalFacilitator;
use x402_core::proto::{
    FacilitatorRequest, InvalidReason, PaymentRequirements, SettlementErrorReason,
    SettlementResult, SupportedResponse, TransactionReference, VerificationResult,
};
use x402_core::scheme::{EXACT_SCHEME, SchemeRegistry, SignedAuthorization};
use x402_core::settle::{ChainClient, ChainError, ChainOutcome, ChainRegistry, SettlementEngine};
use x402_core::verify::VerificationEngine;
use x402_evm::networks::{BASE_SEPOLIA, usdc_deployment};
use x402_evm::{ExactEvmClient, ExactEvmScheme};
use x402_facilitator::facilitator_router;

#[derive(Default)]
struct MemoryChain {
    submissions: AtomicUsize,
}

#[async_trait]
impl ChainClient for MemoryChain {
    async fn submit(
        &self,
        _authorization: &SignedAuthorization,
    ) -> Result<TransactionReference, ChainError> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(TransactionReference(format!("0xtx{n}")))
    }

    async fn query_status(
        &self,
        _reference: &TransactionReference,
    ) -> Result<ChainOutcome, ChainError> {
        Ok(ChainOutcome::Confirmed)
    }

    async fn find_submission(
        &self,
        _authorization: &SignedAuthorization,
    ) -> Result<Option<TransactionReference>, ChainError> {
        Ok(None)
    }
}

fn requirements(amount: u64) -> PaymentRequirements {
    usdc_deployment(&BASE_SEPOLIA.chain_id())
        .unwrap()
        .requirements()
        .amount(amount)
        .pay_to("0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B")
        .resource("/premium")
        .max_timeout_seconds(60)
        .build()
        .unwrap()
}

fn app(chain: &Arc<MemoryChain>) -> axum::Router {
    let mut schemes = SchemeRegistry::new();
    schemes
        .register(EXACT_SCHEME, BASE_SEPOLIA.chain_id(), Arc::new(ExactEvmScheme))
        .unwrap();
    let client: Arc<dyn ChainClient> = chain.clone();
    let chains = ChainRegistry::new().with(BASE_SEPOLIA.chain_id(), client);
    let facilitator = LocalFacilitator::new(
        VerificationEngine::new(Arc::new(schemes)),
        SettlementEngine::in_memory(chains),
    );
    facilitator_router(Arc::new(facilitator))
}

async fn call(app: &axum::Router, method: &str, uri: &str, body: Option<String>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.map_or_else(Body::empty, Body::from))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post(app: &axum::Router, uri: &str, request: &FacilitatorRequest) -> (StatusCode, Value) {
    call(app, "POST", uri, Some(serde_json::to_string(request).unwrap())).await
}

#[tokio::test]
async fn test_exact_payment_verifies_and_settles_once() {
    let chain = Arc::new(MemoryChain::default());
    let app = app(&chain);
    let client = ExactEvmClient::new(PrivateKeySigner::random());
    let payload = client.authorize(&requirements(1000)).await.unwrap();
    let request = FacilitatorRequest::new(requirements(1000), payload);

    let (status, body) = post(&app, "/verify", &request).await;
    assert_eq!(status, StatusCode::OK);
    let verdict: VerificationResult = serde_json::from_value(body).unwrap();
    assert!(verdict.is_valid());
    assert_eq!(verdict.payer(), Some(client.signer().address().to_string().as_str()));
    assert_eq!(chain.submissions.load(Ordering::SeqCst), 0);

    let (status, body) = post(&app, "/settle", &request).await;
    assert_eq!(status, StatusCode::OK);
    let first: SettlementResult = serde_json::from_value(body).unwrap();
    assert!(first.is_success());

    let (_, body) = post(&app, "/settle", &request).await;
    let second: SettlementResult = serde_json::from_value(body).unwrap();
    assert_eq!(second, first);
    assert_eq!(chain.submissions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_short_payment_is_rejected_and_never_submitted() {
    let chain = Arc::new(MemoryChain::default());
    let app = app(&chain);
    let client = ExactEvmClient::new(PrivateKeySigner::random());
    let payload = client.authorize(&requirements(999)).await.unwrap();
    let request = FacilitatorRequest::new(requirements(1000), payload);

    let (status, body) = post(&app, "/verify", &request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isValid"], json!(false));
    let verdict: VerificationResult = serde_json::from_value(body).unwrap();
    assert_eq!(verdict.invalid_reason(), Some(InvalidReason::AmountMismatch));

    let (status, body) = post(&app, "/settle", &request).await;
    assert_eq!(status, StatusCode::OK);
    let settlement: SettlementResult = serde_json::from_value(body).unwrap();
    assert_eq!(settlement.error_reason(), Some(SettlementErrorReason::InvalidPayment));
    assert_eq!(chain.submissions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_network_is_a_verdict_not_an_error() {
    let app = app(&Arc::new(MemoryChain::default()));
    let client = ExactEvmClient::new(PrivateKeySigner::random());
    let mut on_mainnet = requirements(1000);
    on_mainnet.network = "eip155:8453".parse().unwrap();
    let payload = client.authorize(&on_mainnet).await.unwrap();

    let (status, body) = post(&app, "/verify", &FacilitatorRequest::new(on_mainnet, payload)).await;
    assert_eq!(status, StatusCode::OK);
    let verdict: VerificationResult = serde_json::from_value(body).unwrap();
    assert_eq!(verdict.invalid_reason(), Some(InvalidReason::SchemeNotFound));
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = app(&Arc::new(MemoryChain::default()));
    let (status, body) = call(&app, "POST", "/verify", Some("{\"x402Version\": 1".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("invalid request body"));
}

#[tokio::test]
async fn test_future_version_is_bad_request() {
    let chain = Arc::new(MemoryChain::default());
    let app = app(&chain);
    let client = ExactEvmClient::new(PrivateKeySigner::random());
    let payload = client.authorize(&requirements(1000)).await.unwrap();
    let mut body = serde_json::to_value(FacilitatorRequest::new(requirements(1000), payload)).unwrap();
    body["x402Version"] = json!(99);

    let (status, body) = call(&app, "POST", "/settle", Some(body.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("99"));
    assert_eq!(chain.submissions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_supported_and_health() {
    let app = app(&Arc::new(MemoryChain::default()));

    let (status, body) = call(&app, "GET", "/supported", None).await;
    assert_eq!(status, StatusCode::OK);
    let supported: SupportedResponse = serde_json::from_value(body).unwrap();
    assert_eq!(supported.kinds.len(), 1);
    assert_eq!(supported.kinds[0].scheme, EXACT_SCHEME);
    assert_eq!(supported.kinds[0].network, BASE_SEPOLIA.chain_id());

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
