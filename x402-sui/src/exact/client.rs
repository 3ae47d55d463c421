//! Client-side payment signing for the object-model "exact" scheme.

use std::collections::HashMap;
use std::sync::Arc;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::RngExt;
use rand::rng;
use x402_core::encoding::Base64Bytes;
use x402_core::proto::{PaymentPayload, PaymentRequirements, X402Version};
use x402_core::scheme::{BoxFuture, EXACT_SCHEME, SchemeClient, SigningError};
use x402_core::timestamp::UnixTimestamp;

use super::types::{
    ExactSuiPayload, ObjectRef, SuiAddress, SuiSignature, TransferData, normalize_coin_type,
    signing_digest,
};
use crate::NAMESPACE;

/// An ed25519 key that signs transaction digests.
pub trait SuiSigner: Send + Sync {
    /// Public half of the key.
    fn public_key(&self) -> VerifyingKey;

    /// Signs a 32-byte intent digest.
    ///
    /// # Errors
    ///
    /// [`SigningError::Signer`] if the key is unavailable.
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, SigningError>;

    /// Address the key controls.
    fn address(&self) -> SuiAddress {
        SuiAddress::from_public_key(&self.public_key())
    }
}

impl SuiSigner for SigningKey {
    fn public_key(&self) -> VerifyingKey {
        self.verifying_key()
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, SigningError> {
        self.try_sign(digest)
            .map_err(|e| SigningError::Signer(e.to_string()))
    }
}

impl<T: SuiSigner> SuiSigner for Arc<T> {
    fn public_key(&self) -> VerifyingKey {
        (**self).public_key()
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, SigningError> {
        (**self).sign_digest(digest)
    }
}

/// Signs coin transfers for any `sui` requirements entry.
///
/// The client spends coin objects it was handed with
/// [`with_coin`](Self::with_coin); it does not query the chain for them.
#[derive(Debug, Clone)]
pub struct ExactSuiClient<S> {
    signer: S,
    coins: HashMap<String, ObjectRef>,
}

impl<S: SuiSigner> ExactSuiClient<S> {
    /// Creates a client with no spendable coins.
    pub fn new(signer: S) -> Self {
        Self {
            signer,
            coins: HashMap::new(),
        }
    }

    /// Registers the coin object to spend for `coin_type`.
    #[must_use]
    pub fn with_coin(mut self, coin_type: &str, coin: ObjectRef) -> Self {
        self.coins.insert(normalize_coin_type(coin_type), coin);
        self
    }

    /// The signer.
    pub const fn signer(&self) -> &S {
        &self.signer
    }

    /// Builds a payload with a random nonce, valid from now.
    ///
    /// # Errors
    ///
    /// See [`ExactSuiClient::authorize_with`].
    pub fn authorize(&self, requirements: &PaymentRequirements) -> Result<PaymentPayload, SigningError> {
        let nonce: [u8; 32] = rng().random();
        self.authorize_with(requirements, nonce, UnixTimestamp::now())
    }

    /// Builds a payload from an explicit nonce and clock reading.
    ///
    /// # Errors
    ///
    /// [`SigningError::UnsupportedRequirements`] for unusable requirements,
    /// [`SigningError::MissingSignerMaterial`] when no coin of the asset's
    /// type was registered.
    pub fn authorize_with(
        &self,
        requirements: &PaymentRequirements,
        nonce: [u8; 32],
        now: UnixTimestamp,
    ) -> Result<PaymentPayload, SigningError> {
        if requirements.scheme != EXACT_SCHEME || requirements.network.namespace() != NAMESPACE {
            return Err(SigningError::UnsupportedRequirements(format!(
                "{} on {}",
                requirements.scheme, requirements.network
            )));
        }
        let recipient = requirements
            .pay_to
            .parse::<SuiAddress>()
            .map_err(|e| SigningError::UnsupportedRequirements(e.to_string()))?;
        let amount = requirements.max_amount_required.to_u64().ok_or_else(|| {
            SigningError::UnsupportedRequirements(format!(
                "{} does not fit a coin amount",
                requirements.max_amount_required
            ))
        })?;
        let coin = *self
            .coins
            .get(&normalize_coin_type(&requirements.asset))
            .ok_or_else(|| {
                SigningError::MissingSignerMaterial(format!("no coin of type {}", requirements.asset))
            })?;

        let public_key = self.signer.public_key();
        let transfer = TransferData {
            network: requirements.network.reference().to_owned(),
            sender: SuiAddress::from_public_key(&public_key),
            recipient,
            coin_type: requirements.asset.clone(),
            coin,
            amount,
            resource: requirements.resource.clone(),
            nonce,
            expiration: (now + requirements.max_timeout_seconds).as_secs(),
        };
        let bytes = transfer
            .to_bytes()
            .map_err(|e| SigningError::Encoding(e.to_string()))?;
        let signature = SuiSignature {
            signature: self.signer.sign_digest(&signing_digest(&bytes))?,
            public_key,
        };

        let payload = ExactSuiPayload {
            transaction: Base64Bytes(bytes),
            signature: Base64Bytes(signature.to_bytes()),
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

impl<S: SuiSigner> SchemeClient for ExactSuiClient<S> {
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
        Box::pin(async move { self.authorize(requirements) })
    }
}
