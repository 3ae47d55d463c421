//! Client-side payment signing for the EVM "exact" scheme.

use std::future::Future;
use std::sync::Arc;

use alloy_primitives::{B256, Bytes, FixedBytes, Signature};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolStruct;
use rand::RngExt;
use rand::rng;
use x402_core::proto::{PaymentPayload, PaymentRequirements, X402Version};
use x402_core::scheme::{BoxFuture, EXACT_SCHEME, SchemeClient, SigningError};
use x402_core::timestamp::UnixTimestamp;

use super::types::{
    ExactEvmAuthorization, ExactEvmPayload, EvmTerms, TransferWithAuthorization, resource_nonce,
};
use crate::NAMESPACE;

/// How far `validAfter` is backdated, absorbing clock skew between client and chain.
const VALID_AFTER_SKEW_SECS: u64 = 10 * 60;

/// A trait that abstracts signing operations, allowing both owned signers and Arc-wrapped signers.
///
/// Alloy's `Signer` trait is not implemented for `Arc<T>`, and
/// `PrivateKeySigner` is not `Clone`, so shared signers go through this.
pub trait SignerLike: Send + Sync {
    /// Returns the address of the signer.
    fn address(&self) -> alloy_primitives::Address;

    /// Signs the given hash.
    fn sign_hash(
        &self,
        hash: &FixedBytes<32>,
    ) -> impl Future<Output = Result<Signature, alloy_signer::Error>> + Send;
}

impl SignerLike for PrivateKeySigner {
    fn address(&self) -> alloy_primitives::Address {
        Self::address(self)
    }

    async fn sign_hash(&self, hash: &FixedBytes<32>) -> Result<Signature, alloy_signer::Error> {
        alloy_signer::Signer::sign_hash(self, hash).await
    }
}

impl<T: SignerLike> SignerLike for Arc<T> {
    fn address(&self) -> alloy_primitives::Address {
        (**self).address()
    }

    async fn sign_hash(&self, hash: &FixedBytes<32>) -> Result<Signature, alloy_signer::Error> {
        (**self).sign_hash(hash).await
    }
}

/// Signs EIP-3009 authorizations for any `eip155` requirements entry.
#[derive(Debug, Clone)]
pub struct ExactEvmClient<S> {
    signer: S,
}

impl<S: SignerLike> ExactEvmClient<S> {
    /// Creates a client signing with `signer`.
    pub const fn new(signer: S) -> Self {
        Self { signer }
    }

    /// The signer.
    pub const fn signer(&self) -> &S {
        &self.signer
    }

    /// Builds a payload with a random salt, valid from now.
    ///
    /// # Errors
    ///
    /// See [`ExactEvmClient::authorize_with`].
    pub async fn authorize(
        &self,
        requirements: &PaymentRequirements,
    ) -> Result<PaymentPayload, SigningError> {
        let salt: [u8; 32] = rng().random();
        self.authorize_with(requirements, B256::from(salt), UnixTimestamp::now())
            .await
    }

    /// Builds a payload from an explicit salt and clock reading.
    ///
    /// The result is fully determined by the inputs and the signer.
    ///
    /// # Errors
    ///
    /// [`SigningError::UnsupportedRequirements`] if the signing domain cannot
    /// be derived, [`SigningError::Signer`] if the signer fails.
    pub async fn authorize_with(
        &self,
        requirements: &PaymentRequirements,
        salt: B256,
        now: UnixTimestamp,
    ) -> Result<PaymentPayload, SigningError> {
        if requirements.scheme != EXACT_SCHEME || requirements.network.namespace() != NAMESPACE {
            return Err(SigningError::UnsupportedRequirements(format!(
                "{} on {}",
                requirements.scheme, requirements.network
            )));
        }
        let terms = EvmTerms::from_requirements(requirements)
            .map_err(|e| SigningError::UnsupportedRequirements(e.to_string()))?;

        let authorization = ExactEvmAuthorization {
            from: self.signer.address(),
            to: terms.pay_to,
            value: requirements.max_amount_required,
            valid_after: now - VALID_AFTER_SKEW_SECS,
            valid_before: now + requirements.max_timeout_seconds,
            nonce: resource_nonce(&requirements.resource, &salt),
        };
        let hash = TransferWithAuthorization::from(&authorization).eip712_signing_hash(&terms.domain);
        let signature = self
            .signer
            .sign_hash(&hash)
            .await
            .map_err(|e| SigningError::Signer(format!("{e:?}")))?;

        let payload = ExactEvmPayload {
            signature: Bytes::from(signature.as_bytes().to_vec()),
            authorization,
            salt,
        };
        Ok(PaymentPayload {
            x402_version: X402Version::CURRENT,
            scheme: EXACT_SCHEME.to_owned(),
            network: requirements.network.clone(),
            payload: serde_json::to_value(payload)
                .map_err(|e| SigningError::Encoding(e.to_string()))?,
        })
    }
}

impl<S: SignerLike> SchemeClient for ExactEvmClient<S> {
    fn scheme(&self) -> &str {
        EXACT_SCHEME
    }

    fn namespace(&self) -> &str {
        NAMESPACE
    }

    fn build_authorization<'a>(
        &'a self,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<PaymentPayload, SigningError>> {
        Box::pin(self.authorize(requirements))
    }
}
