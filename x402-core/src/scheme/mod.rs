//! Payment schemes.
//!
//! A scheme turns abstract requirements ("pay this much to this address")
//! into a chain-specific signed authorization and back. Each chain family
//! provides one implementation per scheme:
//!
//! - [`PaymentScheme`] - Typed, staged server-side validation (decode, signature, requirement match, window)
//! - [`SchemeFacilitator`] - The object-safe form stored in the [`SchemeRegistry`]
//! - [`SchemeClient`] - Client-side construction of a signed [`PaymentPayload`]
//! - [`PaymentClient`] - Picks a payable entry out of a 402 response
//!
//! Families are selected through the registry by (scheme, network), never
//! by inspecting a payload's shape.

mod client;
mod registry;

pub use client::{PaymentClient, PaymentClientError};
pub use registry::{RegistryError, SchemeKey, SchemeNotFound, SchemeRegistry};

use alloy_primitives::{B256, keccak256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::amount::TokenAmount;
use crate::chain::ChainId;
use crate::proto::{InvalidReason, PaymentPayload, PaymentRequirements, VerificationResult};
use crate::timestamp::UnixTimestamp;

/// A boxed, sendable future, used where traits must stay object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The "exact" scheme name: transfer exactly `maxAmountRequired`.
pub const EXACT_SCHEME: &str = "exact";

/// Deterministic identifier of an authorization, used as the settlement idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub B256);

impl Fingerprint {
    /// Hashes length-prefixed parts, so no two part lists collide by concatenation.
    #[must_use]
    pub fn derive(parts: &[&[u8]]) -> Self {
        let mut buf = Vec::with_capacity(parts.iter().map(|p| p.len() + 8).sum());
        for part in parts {
            buf.extend_from_slice(&(part.len() as u64).to_be_bytes());
            buf.extend_from_slice(part);
        }
        Self(keccak256(buf))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A verified authorization, in the form chain adapters submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedAuthorization {
    /// Scheme that validated the authorization.
    pub scheme: String,
    /// Network it settles on.
    pub network: ChainId,
    /// Address that signed it.
    pub payer: String,
    /// Recipient.
    pub pay_to: String,
    /// Asset identifier.
    pub asset: String,
    /// Exact amount.
    pub amount: TokenAmount,
    /// Protected resource the authorization is bound to.
    pub resource: String,
    /// Idempotency key.
    pub fingerprint: Fingerprint,
    /// The scheme payload, unchanged.
    pub payload: Value,
}

/// A verification stage refused the payment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}: {message}")]
pub struct Rejection {
    /// Stable reason code.
    pub reason: InvalidReason,
    /// Human-readable detail.
    pub message: String,
    /// The payer, once the signature stage identified one.
    pub payer: Option<String>,
}

impl Rejection {
    /// Creates a rejection without a known payer.
    pub fn new<M: Into<String>>(reason: InvalidReason, message: M) -> Self {
        Self {
            reason,
            message: message.into(),
            payer: None,
        }
    }

    /// Attaches the payer identified by an earlier stage.
    #[must_use]
    pub fn with_payer<P: Into<String>>(mut self, payer: P) -> Self {
        self.payer = Some(payer.into());
        self
    }
}

impl From<Rejection> for VerificationResult {
    fn from(rejection: Rejection) -> Self {
        Self::Invalid {
            reason: rejection.reason,
            message: Some(rejection.message),
            payer: rejection.payer,
        }
    }
}

/// Server-side half of a scheme for one chain family.
///
/// Stages run in declaration order and every stage is pure: no chain I/O,
/// no clock reads (the caller passes `now`), no mutation. Structural decoding
/// never touches signature math; requirement matching only sees
/// authorizations whose signature already checked out.
pub trait PaymentScheme: Send + Sync {
    /// The decoded, typed authorization.
    type Authorization: Send + Sync;

    /// Scheme name, e.g. [`EXACT_SCHEME`].
    fn scheme(&self) -> &str;

    /// Structural stage: parse the scheme payload without verifying anything cryptographic.
    ///
    /// # Errors
    ///
    /// [`InvalidReason::InvalidPayload`], [`InvalidReason::InvalidRequirements`] or
    /// [`InvalidReason::MalformedSignature`] for undecodable input.
    fn decode(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<Self::Authorization, Rejection>;

    /// Cryptographic stage: check the signature and return the payer.
    ///
    /// # Errors
    ///
    /// [`InvalidReason::MalformedSignature`] or [`InvalidReason::SignerMismatch`].
    fn verify_signature(
        &self,
        requirements: &PaymentRequirements,
        authorization: &Self::Authorization,
    ) -> Result<String, Rejection>;

    /// Requirement stage: exact match on amount, asset, recipient and resource.
    ///
    /// # Errors
    ///
    /// The first mismatching field's [`InvalidReason`].
    fn match_requirements(
        &self,
        requirements: &PaymentRequirements,
        authorization: &Self::Authorization,
    ) -> Result<(), Rejection>;

    /// Window stage: the authorization is usable at `now`.
    ///
    /// # Errors
    ///
    /// [`InvalidReason::Expired`] or [`InvalidReason::NotYetValid`].
    fn check_window(
        &self,
        authorization: &Self::Authorization,
        now: UnixTimestamp,
    ) -> Result<(), Rejection>;

    /// Idempotency key of a validated authorization.
    fn fingerprint(
        &self,
        requirements: &PaymentRequirements,
        authorization: &Self::Authorization,
    ) -> Fingerprint;

    /// Parameters advertised in `/supported` for `network`.
    fn supported_extra(&self, _network: &ChainId) -> Option<Value> {
        None
    }
}

/// Result of a successful [`SchemeFacilitator::authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAuthorization {
    /// Address that signed the authorization.
    pub payer: String,
    /// Idempotency key.
    pub fingerprint: Fingerprint,
}

/// Object-safe scheme interface held by the [`SchemeRegistry`].
///
/// Implemented for every [`PaymentScheme`]; implement it directly only for
/// schemes that cannot be expressed in stages.
pub trait SchemeFacilitator: Send + Sync {
    /// Scheme name.
    fn scheme(&self) -> &str;

    /// Runs decode, signature and requirement stages in order, stopping at
    /// the first failure. The clock is not consulted.
    ///
    /// # Errors
    ///
    /// The [`Rejection`] of the first failing stage.
    fn authenticate(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<ValidatedAuthorization, Rejection>;

    /// Runs the window stage alone.
    ///
    /// # Errors
    ///
    /// The window [`Rejection`], or whatever stops the payload from decoding.
    fn check_window(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
        now: UnixTimestamp,
    ) -> Result<(), Rejection>;

    /// Every stage, window last.
    ///
    /// # Errors
    ///
    /// The [`Rejection`] of the first failing stage.
    fn validate(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
        now: UnixTimestamp,
    ) -> Result<ValidatedAuthorization, Rejection> {
        let validated = self.authenticate(requirements, payload)?;
        SchemeFacilitator::check_window(self, requirements, payload, now)
            .map_err(|rejection| rejection.with_payer(validated.payer.clone()))?;
        Ok(validated)
    }

    /// Parameters advertised in `/supported` for `network`.
    fn supported_extra(&self, network: &ChainId) -> Option<Value>;
}

impl<T: PaymentScheme> SchemeFacilitator for T {
    fn scheme(&self) -> &str {
        PaymentScheme::scheme(self)
    }

    fn authenticate(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<ValidatedAuthorization, Rejection> {
        let authorization = self.decode(requirements, payload)?;
        let payer = self.verify_signature(requirements, &authorization)?;
        self.match_requirements(requirements, &authorization)
            .map_err(|rejection| rejection.with_payer(payer.clone()))?;
        let fingerprint = self.fingerprint(requirements, &authorization);
        Ok(ValidatedAuthorization { payer, fingerprint })
    }

    fn check_window(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
        now: UnixTimestamp,
    ) -> Result<(), Rejection> {
        let authorization = self.decode(requirements, payload)?;
        PaymentScheme::check_window(self, &authorization, now)
    }

    fn supported_extra(&self, network: &ChainId) -> Option<Value> {
        PaymentScheme::supported_extra(self, network)
    }
}

/// Errors raised while building a payment on the client side.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// The requirements cannot be paid by this scheme client.
    #[error("unsupported requirements: {0}")]
    UnsupportedRequirements(String),
    /// Signer material needed for these requirements is missing.
    #[error("missing signer material: {0}")]
    MissingSignerMaterial(String),
    /// The authorization could not be serialized.
    #[error("encoding failed: {0}")]
    Encoding(String),
    /// The key-management backend refused or failed to sign.
    #[error("signing failed: {0}")]
    Signer(String),
}

/// Client-side half of a scheme for one chain family.
pub trait SchemeClient: Send + Sync {
    /// Scheme name.
    fn scheme(&self) -> &str;

    /// CAIP-2 namespace this client signs for.
    fn namespace(&self) -> &str;

    /// Builds and signs a payload paying exactly `maxAmountRequired` to `payTo`.
    fn build_authorization<'a>(
        &'a self,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<PaymentPayload, SigningError>>;
}
