//! Server-side verification stages for the EVM "exact" scheme.

use alloy_primitives::{B256, Signature};
use alloy_sol_types::SolStruct;
use x402_core::proto::{InvalidReason, PaymentPayload, PaymentRequirements};
use x402_core::scheme::{EXACT_SCHEME, Fingerprint, PaymentScheme, Rejection};
use x402_core::timestamp::UnixTimestamp;

use super::signature;
use super::types::{
    ExactEvmAuthorization, ExactEvmPayload, EvmTerms, TransferWithAuthorization, resource_nonce,
};

/// Stateless verifier for EIP-3009 authorizations on any `eip155` chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactEvmScheme;

/// A decoded EVM authorization, ready for the signature stage.
#[derive(Debug, Clone)]
pub struct EvmAuthorization {
    terms: EvmTerms,
    authorization: ExactEvmAuthorization,
    salt: B256,
    signature: Signature,
}

impl EvmAuthorization {
    /// The signed fields.
    #[must_use]
    pub const fn authorization(&self) -> &ExactEvmAuthorization {
        &self.authorization
    }

    /// EIP-712 hash the payer signed.
    #[must_use]
    pub fn signing_hash(&self) -> B256 {
        TransferWithAuthorization::from(&self.authorization).eip712_signing_hash(&self.terms.domain)
    }
}

impl PaymentScheme for ExactEvmScheme {
    type Authorization = EvmAuthorization;

    fn scheme(&self) -> &str {
        EXACT_SCHEME
    }

    fn decode(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<EvmAuthorization, Rejection> {
        let terms = EvmTerms::from_requirements(requirements)
            .map_err(|e| Rejection::new(InvalidReason::InvalidRequirements, e.to_string()))?;
        let decoded: ExactEvmPayload = serde_json::from_value(payload.payload.clone())
            .map_err(|e| Rejection::new(InvalidReason::InvalidPayload, e.to_string()))?;
        let signature = signature::parse(&decoded.signature).ok_or_else(|| {
            Rejection::new(
                InvalidReason::MalformedSignature,
                format!(
                    "expected a 64 or 65 byte signature, got {} bytes",
                    decoded.signature.len()
                ),
            )
        })?;
        Ok(EvmAuthorization {
            terms,
            authorization: decoded.authorization,
            salt: decoded.salt,
            signature,
        })
    }

    fn verify_signature(
        &self,
        _requirements: &PaymentRequirements,
        auth: &EvmAuthorization,
    ) -> Result<String, Rejection> {
        let recovered = signature::recover(&auth.signature, &auth.signing_hash()).ok_or_else(|| {
            Rejection::new(InvalidReason::MalformedSignature, "signature is not recoverable")
        })?;
        let claimed = auth.authorization.from;
        if recovered != claimed {
            return Err(Rejection::new(
                InvalidReason::SignerMismatch,
                format!("signed by {recovered}, claimed by {claimed}"),
            ));
        }
        Ok(claimed.to_string())
    }

    fn match_requirements(
        &self,
        requirements: &PaymentRequirements,
        auth: &EvmAuthorization,
    ) -> Result<(), Rejection> {
        let authorization = &auth.authorization;
        if authorization.to != auth.terms.pay_to {
            return Err(Rejection::new(
                InvalidReason::RecipientMismatch,
                format!("pays {}, expected {}", authorization.to, auth.terms.pay_to),
            ));
        }
        if authorization.value != requirements.max_amount_required {
            return Err(Rejection::new(
                InvalidReason::AmountMismatch,
                format!(
                    "authorizes {}, expected exactly {}",
                    authorization.value, requirements.max_amount_required
                ),
            ));
        }
        if authorization.nonce != resource_nonce(&requirements.resource, &auth.salt) {
            return Err(Rejection::new(
                InvalidReason::ResourceMismatch,
                format!("nonce is not bound to {:?}", requirements.resource),
            ));
        }
        Ok(())
    }

    fn check_window(&self, auth: &EvmAuthorization, now: UnixTimestamp) -> Result<(), Rejection> {
        let authorization = &auth.authorization;
        if authorization.valid_before.is_expired_at(now) {
            return Err(Rejection::new(
                InvalidReason::Expired,
                format!("validBefore {} is not after {now}", authorization.valid_before),
            ));
        }
        if authorization.valid_after > now {
            return Err(Rejection::new(
                InvalidReason::NotYetValid,
                format!("validAfter {} is after {now}", authorization.valid_after),
            ));
        }
        Ok(())
    }

    fn fingerprint(&self, requirements: &PaymentRequirements, auth: &EvmAuthorization) -> Fingerprint {
        Fingerprint::derive(&[
            EXACT_SCHEME.as_bytes(),
            requirements.network.to_string().as_bytes(),
            auth.terms.asset.as_slice(),
            auth.authorization.from.as_slice(),
            auth.authorization.nonce.as_slice(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Bytes;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use serde_json::json;
    use x402_core::amount::TokenAmount;
    use x402_core::chain::ChainId;
    use x402_core::proto::X402Version;
    use x402_core::scheme::SchemeFacilitator;

    const NOW: UnixTimestamp = UnixTimestamp::from_secs(1_700_000_000);

    fn requirements_on(network: &str, resource: &str) -> PaymentRequirements {
        PaymentRequirements::builder("exact", network.parse::<ChainId>().unwrap())
            .amount(1000)
            .asset("0x036CbD53842c5426634e7929541eC2318f3dCF7e")
            .pay_to("0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B")
            .resource(resource)
            .max_timeout_seconds(60)
            .extra(json!({"name": "USDC", "version": "2"}))
            .build()
            .unwrap()
    }

    fn requirements() -> PaymentRequirements {
        requirements_on("eip155:84532", "/premium")
    }

    fn sign(
        signer: &PrivateKeySigner,
        requirements: &PaymentRequirements,
        value: u64,
    ) -> PaymentPayload {
        let terms = EvmTerms::from_requirements(requirements).unwrap();
        let salt = B256::repeat_byte(9);
        let authorization = ExactEvmAuthorization {
            from: signer.address(),
            to: terms.pay_to,
            value: TokenAmount::from(value),
            valid_after: NOW - 600,
            valid_before: NOW + 60,
            nonce: resource_nonce(&requirements.resource, &salt),
        };
        let hash = TransferWithAuthorization::from(&authorization).eip712_signing_hash(&terms.domain);
        let signature = signer.sign_hash_sync(&hash).unwrap();
        let payload = ExactEvmPayload {
            signature: Bytes::from(signature.as_bytes().to_vec()),
            authorization,
            salt,
        };
        PaymentPayload {
            x402_version: X402Version::V1,
            scheme: "exact".into(),
            network: requirements.network.clone(),
            payload: serde_json::to_value(payload).unwrap(),
        }
    }

    fn reason(result: Result<impl Sized, Rejection>) -> InvalidReason {
        match result {
            Ok(_) => panic!("expected a rejection"),
            Err(rejection) => rejection.reason,
        }
    }

    #[test]
    fn test_exact_amount_is_valid() {
        let signer = PrivateKeySigner::random();
        let payload = sign(&signer, &requirements(), 1000);
        let validated = ExactEvmScheme.validate(&requirements(), &payload, NOW).unwrap();
        assert_eq!(validated.payer, signer.address().to_string());
    }

    #[test]
    fn test_one_unit_short_is_amount_mismatch() {
        let signer = PrivateKeySigner::random();
        let payload = sign(&signer, &requirements(), 999);
        let rejection = ExactEvmScheme
            .validate(&requirements(), &payload, NOW)
            .unwrap_err();
        assert_eq!(rejection.reason, InvalidReason::AmountMismatch);
        assert_eq!(rejection.payer, Some(signer.address().to_string()));
    }

    #[test]
    fn test_signature_does_not_replay_on_another_network() {
        let signer = PrivateKeySigner::random();
        let payload = sign(&signer, &requirements(), 1000);
        let mainnet = requirements_on("eip155:8453", "/premium");
        let mut replayed = payload;
        replayed.network = mainnet.network.clone();
        assert_eq!(
            reason(ExactEvmScheme.validate(&mainnet, &replayed, NOW)),
            InvalidReason::SignerMismatch
        );
    }

    #[test]
    fn test_signature_does_not_replay_on_another_resource() {
        let signer = PrivateKeySigner::random();
        let payload = sign(&signer, &requirements(), 1000);
        let other = requirements_on("eip155:84532", "/other");
        assert_eq!(
            reason(ExactEvmScheme.validate(&other, &payload, NOW)),
            InvalidReason::ResourceMismatch
        );
    }

    #[test]
    fn test_validity_window() {
        let signer = PrivateKeySigner::random();
        let payload = sign(&signer, &requirements(), 1000);
        assert!(ExactEvmScheme.validate(&requirements(), &payload, NOW + 59).is_ok());
        assert_eq!(
            reason(ExactEvmScheme.validate(&requirements(), &payload, NOW + 60)),
            InvalidReason::Expired
        );
        assert_eq!(
            reason(ExactEvmScheme.validate(&requirements(), &payload, NOW - 601)),
            InvalidReason::NotYetValid
        );
    }

    #[test]
    fn test_tampered_fields_break_the_signature() {
        let signer = PrivateKeySigner::random();
        let mut payload = sign(&signer, &requirements(), 1000);
        payload.payload["authorization"]["to"] = json!("0x0000000000000000000000000000000000000001");
        assert_eq!(
            reason(ExactEvmScheme.validate(&requirements(), &payload, NOW)),
            InvalidReason::SignerMismatch
        );
    }

    #[test]
    fn test_malformed_signature_and_payload() {
        let signer = PrivateKeySigner::random();
        let mut payload = sign(&signer, &requirements(), 1000);
        payload.payload["signature"] = json!("0x1234");
        assert_eq!(
            reason(ExactEvmScheme.validate(&requirements(), &payload, NOW)),
            InvalidReason::MalformedSignature
        );

        payload.payload = json!({"signature": "0x"});
        assert_eq!(
            reason(ExactEvmScheme.validate(&requirements(), &payload, NOW)),
            InvalidReason::InvalidPayload
        );
    }

    #[test]
    fn test_missing_domain_is_invalid_requirements() {
        let signer = PrivateKeySigner::random();
        let payload = sign(&signer, &requirements(), 1000);
        let mut bare = requirements();
        bare.extra = None;
        assert_eq!(
            reason(ExactEvmScheme.validate(&bare, &payload, NOW)),
            InvalidReason::InvalidRequirements
        );
    }

    #[test]
    fn test_fingerprint_ignores_signature_encoding() {
        let signer = PrivateKeySigner::random();
        let payload = sign(&signer, &requirements(), 1000);
        let mut compact = payload.clone();
        let full: ExactEvmPayload = serde_json::from_value(payload.payload.clone()).unwrap();
        let parsed = Signature::from_raw(&full.signature).unwrap();
        compact.payload["signature"] = json!(Bytes::from(parsed.as_erc2098().to_vec()));

        let a = ExactEvmScheme.validate(&requirements(), &payload, NOW).unwrap();
        let b = ExactEvmScheme.validate(&requirements(), &compact, NOW).unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
    }
}
