//! Fixtures shared by the unit tests of this crate.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::amount::TokenAmount;
use crate::chain::ChainId;
use crate::proto::{
    InvalidReason, PaymentPayload, PaymentRequirements, TransactionReference, X402Version,
};
use crate::scheme::{Fingerprint, PaymentScheme, Rejection, SchemeRegistry, SignedAuthorization};
use crate::settle::{ChainClient, ChainError, ChainOutcome, ChainRegistry, SettlementEngine};
use crate::timestamp::UnixTimestamp;
use crate::verify::VerificationEngine;

pub(crate) const NOW: UnixTimestamp = UnixTimestamp::from_secs(1_700_000_000);
pub(crate) const PAY_TO: &str = "0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B";
const ASSET: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";

/// A scheme whose "signature" is `sig:<from>`, so stage ordering can be
/// exercised without real cryptography.
pub(crate) struct ToyScheme;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ToyAuthorization {
    from: String,
    to: String,
    amount: TokenAmount,
    resource: String,
    valid_before: UnixTimestamp,
    nonce: String,
    signature: String,
}

impl PaymentScheme for ToyScheme {
    type Authorization = ToyAuthorization;

    fn scheme(&self) -> &str {
        "exact"
    }

    fn decode(
        &self,
        _requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<ToyAuthorization, Rejection> {
        serde_json::from_value(payload.payload.clone())
            .map_err(|e| Rejection::new(InvalidReason::InvalidPayload, e.to_string()))
    }

    fn verify_signature(
        &self,
        _requirements: &PaymentRequirements,
        auth: &ToyAuthorization,
    ) -> Result<String, Rejection> {
        let Some(signer) = auth.signature.strip_prefix("sig:") else {
            return Err(Rejection::new(InvalidReason::MalformedSignature, "no prefix"));
        };
        if signer != auth.from {
            return Err(Rejection::new(InvalidReason::SignerMismatch, signer));
        }
        Ok(auth.from.clone())
    }

    fn match_requirements(
        &self,
        requirements: &PaymentRequirements,
        auth: &ToyAuthorization,
    ) -> Result<(), Rejection> {
        if auth.to != requirements.pay_to {
            return Err(Rejection::new(InvalidReason::RecipientMismatch, &auth.to));
        }
        if auth.amount != requirements.max_amount_required {
            return Err(Rejection::new(
                InvalidReason::AmountMismatch,
                auth.amount.to_string(),
            ));
        }
        if auth.resource != requirements.resource {
            return Err(Rejection::new(InvalidReason::ResourceMismatch, &auth.resource));
        }
        Ok(())
    }

    fn check_window(&self, auth: &ToyAuthorization, now: UnixTimestamp) -> Result<(), Rejection> {
        if auth.valid_before.is_expired_at(now) {
            return Err(Rejection::new(InvalidReason::Expired, "expired"));
        }
        Ok(())
    }

    fn fingerprint(&self, requirements: &PaymentRequirements, auth: &ToyAuthorization) -> Fingerprint {
        Fingerprint::derive(&[
            b"exact",
            requirements.network.to_string().as_bytes(),
            auth.from.as_bytes(),
            auth.nonce.as_bytes(),
        ])
    }
}

pub(crate) fn network() -> ChainId {
    ChainId::new("eip155", "84532")
}

pub(crate) fn requirements() -> PaymentRequirements {
    PaymentRequirements::builder("exact", network())
        .amount(1000)
        .asset(ASSET)
        .pay_to(PAY_TO)
        .resource("/premium")
        .max_timeout_seconds(60)
        .build()
        .unwrap()
}

/// A toy payload valid until `NOW + 60`.
pub(crate) fn payload_with(amount: u64, nonce: &str) -> PaymentPayload {
    payload_until(amount, nonce, NOW + 60)
}

/// A toy payload valid for the next minute of wall-clock time.
pub(crate) fn fresh_payload(amount: u64, nonce: &str) -> PaymentPayload {
    payload_until(amount, nonce, UnixTimestamp::now() + 60)
}

fn payload_until(amount: u64, nonce: &str, valid_before: UnixTimestamp) -> PaymentPayload {
    PaymentPayload {
        x402_version: X402Version::V1,
        scheme: "exact".into(),
        network: network(),
        payload: json!({
            "from": "0xpayer",
            "to": PAY_TO,
            "amount": amount.to_string(),
            "resource": "/premium",
            "validBefore": valid_before.to_string(),
            "nonce": nonce,
            "signature": "sig:0xpayer",
        }),
    }
}

pub(crate) fn engine() -> VerificationEngine {
    let mut registry = SchemeRegistry::new();
    registry
        .register_for_namespace("exact", "eip155", Arc::new(ToyScheme))
        .unwrap();
    VerificationEngine::new(Arc::new(registry))
}

/// Confirms every submission immediately and counts them.
#[derive(Default)]
pub(crate) struct InstantChain(AtomicUsize);

impl InstantChain {
    pub(crate) fn submissions(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for InstantChain {
    async fn submit(
        &self,
        _authorization: &SignedAuthorization,
    ) -> Result<TransactionReference, ChainError> {
        let n = self.0.fetch_add(1, Ordering::SeqCst);
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

pub(crate) fn instant_settler(chain: &Arc<InstantChain>) -> SettlementEngine {
    let client: Arc<dyn ChainClient> = chain.clone();
    SettlementEngine::in_memory(ChainRegistry::new().with(network(), client))
}
