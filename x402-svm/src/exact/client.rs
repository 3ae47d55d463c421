//! Client-side payment signing for the account-model "exact" scheme.

use rand::RngExt;
use rand::rng;
use solana_signer::Signer;
use x402_core::encoding::Base64Bytes;
use x402_core::proto::{PaymentPayload, PaymentRequirements, X402Version};
use x402_core::scheme::{BoxFuture, EXACT_SCHEME, SchemeClient, SigningError};
use x402_core::timestamp::UnixTimestamp;

use super::types::{
    AccountKey, ExactSvmPayload, SvmExtra, TOKEN_PROGRAM_ID, TransferMessage, signing_bytes,
};
use crate::NAMESPACE;
use crate::networks::mint_deployment;

/// Signs transfer messages for any `solana` requirements entry.
#[derive(Debug)]
pub struct ExactSvmClient<S> {
    signer: S,
}

impl<S: Signer + Send + Sync> ExactSvmClient<S> {
    /// Creates a client signing with `signer`.
    pub const fn new(signer: S) -> Self {
        Self { signer }
    }

    /// The signer.
    pub const fn signer(&self) -> &S {
        &self.signer
    }

    /// Builds a payload with a random nonce, valid from now.
    ///
    /// # Errors
    ///
    /// See [`ExactSvmClient::authorize_with`].
    pub fn authorize(&self, requirements: &PaymentRequirements) -> Result<PaymentPayload, SigningError> {
        let nonce: [u8; 32] = rng().random();
        self.authorize_with(requirements, nonce, UnixTimestamp::now())
    }

    /// Builds a payload from an explicit nonce and clock reading.
    ///
    /// Decimals come from `extra.decimals` or the known mint table. The fee
    /// payer is `extra.feePayer` when the facilitator advertises one, the
    /// signer otherwise.
    ///
    /// # Errors
    ///
    /// [`SigningError::UnsupportedRequirements`] for unusable requirements,
    /// [`SigningError::Signer`] if the signer fails.
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
        let unsupported = |e: &dyn std::fmt::Display| SigningError::UnsupportedRequirements(e.to_string());
        let extra = requirements
            .extra_as::<SvmExtra>()
            .map_err(|e| unsupported(&e))?
            .unwrap_or_default();
        let mint = requirements.asset.parse::<AccountKey>().map_err(|e| unsupported(&e))?;
        let pay_to = requirements.pay_to.parse::<AccountKey>().map_err(|e| unsupported(&e))?;
        let amount = requirements.max_amount_required.to_u64().ok_or_else(|| {
            SigningError::UnsupportedRequirements(format!(
                "{} does not fit a token amount",
                requirements.max_amount_required
            ))
        })?;
        let decimals = extra
            .decimals
            .or_else(|| mint_deployment(&requirements.network, &requirements.asset).map(|d| d.decimals))
            .ok_or_else(|| {
                SigningError::UnsupportedRequirements(format!(
                    "decimals of mint {mint} are unknown"
                ))
            })?;

        let owner = self
            .signer
            .try_pubkey()
            .map(|pubkey| AccountKey(pubkey.to_bytes()))
            .map_err(|e| SigningError::Signer(e.to_string()))?;
        let message = TransferMessage {
            cluster: requirements.network.reference().to_owned(),
            program_id: extra
                .token_program
                .unwrap_or_else(|| AccountKey::from(TOKEN_PROGRAM_ID)),
            mint,
            source_owner: owner,
            destination_owner: pay_to,
            authority: owner,
            fee_payer: extra.fee_payer.unwrap_or(owner),
            amount,
            decimals,
            nonce,
            resource: requirements.resource.clone(),
            valid_until: (now + requirements.max_timeout_seconds).as_secs(),
        };
        let bytes = message
            .to_bytes()
            .map_err(|e| SigningError::Encoding(e.to_string()))?;
        let signature = self
            .signer
            .try_sign_message(&signing_bytes(&bytes))
            .map_err(|e| SigningError::Signer(e.to_string()))?;

        let payload = ExactSvmPayload {
            message: Base64Bytes(bytes),
            signature: signature.to_string(),
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

impl<S: Signer + Send + Sync> SchemeClient for ExactSvmClient<S> {
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
