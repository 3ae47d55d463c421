//! Staged payment verification.
//!
//! Stages run in a fixed order and the first failure wins:
//!
//! 1. Structural: version, requirements syntax, scheme and network echo
//! 2. Scheme lookup in the [`SchemeRegistry`]
//! 3. Scheme decode (structural, no crypto)
//! 4. Signature check, which identifies the payer
//! 5. Requirement match
//! 6. Validity window against `now`
//!
//! Stages 1 to 5 do not read the clock. Their result, an
//! [`AuthenticatedPayment`], identifies the authorization for settlement
//! replay even after its window has closed.
//!
//! Verification is a pure function of `(requirements, payload, now)`.
//! It performs no chain I/O and mutates nothing, so calling it twice gives
//! the same answer.

use std::sync::Arc;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::proto::{InvalidReason, PaymentPayload, PaymentRequirements, VerificationResult, X402Version};
use crate::scheme::{Fingerprint, Rejection, SchemeFacilitator, SchemeRegistry, SignedAuthorization};
use crate::timestamp::UnixTimestamp;

/// A payment whose signature and terms checked out, before the clock is read.
///
/// Enough to look up or reconcile a settlement. Submitting a new one takes a
/// [`VerifiedPayment`], obtained through [`VerificationEngine::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedPayment {
    requirements: PaymentRequirements,
    payload: PaymentPayload,
    authorization: SignedAuthorization,
}

impl AuthenticatedPayment {
    /// The requirements the payment was checked against.
    #[must_use]
    pub const fn requirements(&self) -> &PaymentRequirements {
        &self.requirements
    }

    /// The authorization to submit.
    #[must_use]
    pub const fn authorization(&self) -> &SignedAuthorization {
        &self.authorization
    }

    /// Address that signed the authorization.
    #[must_use]
    pub fn payer(&self) -> &str {
        &self.authorization.payer
    }

    /// Idempotency key.
    #[must_use]
    pub const fn fingerprint(&self) -> Fingerprint {
        self.authorization.fingerprint
    }
}

/// A payment that passed every verification stage.
///
/// Only [`VerificationEngine`] constructs this type, and fresh submissions
/// accept nothing else, so an unverified payment cannot reach the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment(AuthenticatedPayment);

impl VerifiedPayment {
    /// The payment without its window check.
    #[must_use]
    pub const fn authenticated(&self) -> &AuthenticatedPayment {
        &self.0
    }

    /// The requirements the payment was verified against.
    #[must_use]
    pub const fn requirements(&self) -> &PaymentRequirements {
        self.0.requirements()
    }

    /// The authorization to submit.
    #[must_use]
    pub const fn authorization(&self) -> &SignedAuthorization {
        self.0.authorization()
    }

    /// Address that signed the authorization.
    #[must_use]
    pub fn payer(&self) -> &str {
        self.0.payer()
    }

    /// Idempotency key.
    #[must_use]
    pub const fn fingerprint(&self) -> Fingerprint {
        self.0.fingerprint()
    }
}

impl From<&VerifiedPayment> for VerificationResult {
    fn from(verified: &VerifiedPayment) -> Self {
        Self::Valid {
            payer: verified.payer().to_owned(),
        }
    }
}

/// Runs the verification stages against a shared [`SchemeRegistry`].
#[derive(Debug, Clone)]
pub struct VerificationEngine {
    registry: Arc<SchemeRegistry>,
    version: X402Version,
}

impl VerificationEngine {
    /// Creates an engine advertising [`X402Version::CURRENT`].
    #[must_use]
    pub fn new(registry: Arc<SchemeRegistry>) -> Self {
        Self {
            registry,
            version: X402Version::CURRENT,
        }
    }

    /// Overrides the advertised protocol version.
    #[must_use]
    pub const fn with_version(mut self, version: X402Version) -> Self {
        self.version = version;
        self
    }

    /// The registry schemes are looked up in.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SchemeRegistry> {
        &self.registry
    }

    /// The advertised protocol version.
    #[must_use]
    pub const fn version(&self) -> X402Version {
        self.version
    }

    /// Verifies against the current time.
    #[must_use]
    pub fn verify(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> VerificationResult {
        self.verify_at(requirements, payload, UnixTimestamp::now())
    }

    /// Verifies as of `now`.
    #[must_use]
    pub fn verify_at(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
        now: UnixTimestamp,
    ) -> VerificationResult {
        match self.check_at(requirements, payload, now) {
            Ok(verified) => VerificationResult::from(&verified),
            Err(rejection) => rejection.into(),
        }
    }

    /// Verifies against the current time, keeping the settleable result.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] of the first failing stage.
    pub fn check(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<VerifiedPayment, Rejection> {
        self.check_at(requirements, payload, UnixTimestamp::now())
    }

    /// Verifies as of `now`, keeping the settleable result.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] of the first failing stage.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "x402.verify",
            skip_all,
            fields(scheme = %payload.scheme, network = %payload.network),
            err
        )
    )]
    pub fn check_at(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
        now: UnixTimestamp,
    ) -> Result<VerifiedPayment, Rejection> {
        let authenticated = self.authenticate(requirements, payload)?;
        self.admit_at(&authenticated, now)
    }

    /// Runs every stage except the window check.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] of the first failing stage.
    pub fn authenticate(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<AuthenticatedPayment, Rejection> {
        self.check_structure(requirements, payload)?;
        let scheme = self.scheme_for(requirements)?;
        let validated = scheme.authenticate(requirements, payload)?;

        #[cfg(feature = "telemetry")]
        tracing::debug!(payer = %validated.payer, fingerprint = %validated.fingerprint, "payment authenticated");

        Ok(AuthenticatedPayment {
            requirements: requirements.clone(),
            payload: payload.clone(),
            authorization: SignedAuthorization {
                scheme: requirements.scheme.clone(),
                network: requirements.network.clone(),
                payer: validated.payer,
                pay_to: requirements.pay_to.clone(),
                asset: requirements.asset.clone(),
                amount: requirements.max_amount_required,
                resource: requirements.resource.clone(),
                fingerprint: validated.fingerprint,
                payload: payload.payload.clone(),
            },
        })
    }

    /// Runs the window check against the current time.
    ///
    /// # Errors
    ///
    /// [`InvalidReason::Expired`] or [`InvalidReason::NotYetValid`].
    pub fn admit(&self, payment: &AuthenticatedPayment) -> Result<VerifiedPayment, Rejection> {
        self.admit_at(payment, UnixTimestamp::now())
    }

    /// Runs the window check as of `now`.
    ///
    /// # Errors
    ///
    /// [`InvalidReason::Expired`] or [`InvalidReason::NotYetValid`].
    pub fn admit_at(
        &self,
        payment: &AuthenticatedPayment,
        now: UnixTimestamp,
    ) -> Result<VerifiedPayment, Rejection> {
        self.scheme_for(&payment.requirements)?
            .check_window(&payment.requirements, &payment.payload, now)
            .map_err(|rejection| rejection.with_payer(payment.payer()))?;
        Ok(VerifiedPayment(payment.clone()))
    }

    fn scheme_for(
        &self,
        requirements: &PaymentRequirements,
    ) -> Result<&Arc<dyn SchemeFacilitator>, Rejection> {
        self.registry
            .lookup(&requirements.scheme, &requirements.network)
            .map_err(|e| Rejection::new(InvalidReason::SchemeNotFound, e.to_string()))
    }

    fn check_structure(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<(), Rejection> {
        self.version
            .negotiate(payload.x402_version)
            .map_err(|e| Rejection::new(InvalidReason::UnsupportedVersion, e.to_string()))?;
        requirements
            .validate()
            .map_err(|e| Rejection::new(InvalidReason::InvalidRequirements, e.to_string()))?;
        if payload.scheme != requirements.scheme {
            return Err(Rejection::new(
                InvalidReason::SchemeMismatch,
                format!(
                    "payload scheme {:?} does not match {:?}",
                    payload.scheme, requirements.scheme
                ),
            ));
        }
        if payload.network != requirements.network {
            return Err(Rejection::new(
                InvalidReason::NetworkMismatch,
                format!(
                    "payload network {} does not match {}",
                    payload.network, requirements.network
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::TokenAmount;
    use crate::chain::ChainId;
    use crate::testing::{NOW, PAY_TO, engine, network, payload_with, requirements};
    use serde_json::json;

    fn reason(result: &VerificationResult) -> Option<InvalidReason> {
        result.invalid_reason()
    }

    #[test]
    fn test_valid_payment() {
        let result = engine().verify_at(&requirements(), &payload_with(1000, "n1"), NOW);
        assert_eq!(
            result,
            VerificationResult::Valid {
                payer: "0xpayer".into()
            }
        );
    }

    #[test]
    fn test_verification_is_deterministic() {
        let engine = engine();
        let (requirements, payload) = (requirements(), payload_with(999, "n1"));
        assert_eq!(
            engine.verify_at(&requirements, &payload, NOW),
            engine.verify_at(&requirements, &payload, NOW)
        );
    }

    #[test]
    fn test_amount_off_by_one_either_way() {
        let engine = engine();
        for amount in [999, 1001] {
            let result = engine.verify_at(&requirements(), &payload_with(amount, "n1"), NOW);
            assert_eq!(reason(&result), Some(InvalidReason::AmountMismatch));
            assert_eq!(result.payer(), Some("0xpayer"));
        }
    }

    #[test]
    fn test_expiry_boundary() {
        let engine = engine();
        let payload = payload_with(1000, "n1");
        assert!(engine.verify_at(&requirements(), &payload, NOW + 59).is_valid());
        for now in [NOW + 60, NOW + 61] {
            let result = engine.verify_at(&requirements(), &payload, now);
            assert_eq!(reason(&result), Some(InvalidReason::Expired));
        }
    }

    #[test]
    fn test_structural_checks_precede_lookup() {
        let engine = engine();
        let mut payload = payload_with(1000, "n1");
        payload.x402_version = X402Version(2);
        let result = engine.verify_at(&requirements(), &payload, NOW);
        assert_eq!(reason(&result), Some(InvalidReason::UnsupportedVersion));

        let mut payload = payload_with(1000, "n1");
        payload.scheme = "upto".into();
        let result = engine.verify_at(&requirements(), &payload, NOW);
        assert_eq!(reason(&result), Some(InvalidReason::SchemeMismatch));

        let mut payload = payload_with(1000, "n1");
        payload.network = ChainId::new("eip155", "8453");
        let result = engine.verify_at(&requirements(), &payload, NOW);
        assert_eq!(reason(&result), Some(InvalidReason::NetworkMismatch));

        let mut requirements = requirements();
        requirements.max_amount_required = TokenAmount::ZERO;
        let result = engine.verify_at(&requirements, &payload_with(0, "n1"), NOW);
        assert_eq!(reason(&result), Some(InvalidReason::InvalidRequirements));
    }

    #[test]
    fn test_unregistered_pair() {
        let engine = VerificationEngine::new(Arc::new(SchemeRegistry::new()));
        let result = engine.verify_at(&requirements(), &payload_with(1000, "n1"), NOW);
        assert_eq!(reason(&result), Some(InvalidReason::SchemeNotFound));
    }

    #[test]
    fn test_signature_stage_runs_before_requirement_match() {
        let mut payload = payload_with(999, "n1");
        payload.payload["signature"] = json!("sig:0xsomeoneelse");
        let result = engine().verify_at(&requirements(), &payload, NOW);
        assert_eq!(reason(&result), Some(InvalidReason::SignerMismatch));
        assert_eq!(result.payer(), None);

        payload.payload["signature"] = json!("garbage");
        let result = engine().verify_at(&requirements(), &payload, NOW);
        assert_eq!(reason(&result), Some(InvalidReason::MalformedSignature));
    }

    #[test]
    fn test_undecodable_payload() {
        let mut payload = payload_with(1000, "n1");
        payload.payload = json!({"from": 42});
        let result = engine().verify_at(&requirements(), &payload, NOW);
        assert_eq!(reason(&result), Some(InvalidReason::InvalidPayload));
    }

    #[test]
    fn test_window_is_checked_apart_from_terms() {
        let engine = engine();
        let authenticated = engine
            .authenticate(&requirements(), &payload_with(1000, "n1"))
            .unwrap();
        assert!(engine.admit_at(&authenticated, NOW).is_ok());
        let rejection = engine.admit_at(&authenticated, NOW + 60).unwrap_err();
        assert_eq!(rejection.reason, InvalidReason::Expired);
        assert_eq!(rejection.payer.as_deref(), Some("0xpayer"));

        let rejection = engine
            .authenticate(&requirements(), &payload_with(999, "n1"))
            .unwrap_err();
        assert_eq!(rejection.reason, InvalidReason::AmountMismatch);
    }

    #[test]
    fn test_verified_payment_carries_authorization() {
        let verified = engine()
            .check_at(&requirements(), &payload_with(1000, "n1"), NOW)
            .unwrap();
        let auth = verified.authorization();
        assert_eq!(auth.payer, "0xpayer");
        assert_eq!(auth.pay_to, PAY_TO);
        assert_eq!(auth.amount, TokenAmount::from(1000));
        assert_eq!(auth.network, network());

        let other = engine()
            .check_at(&requirements(), &payload_with(1000, "n2"), NOW)
            .unwrap();
        assert_ne!(verified.fingerprint(), other.fingerprint());
    }
}
