//! Server-side verification stages for the object-model "exact" scheme.

use x402_core::amount::TokenAmount;
use x402_core::proto::{InvalidReason, PaymentPayload, PaymentRequirements};
use x402_core::scheme::{EXACT_SCHEME, Fingerprint, PaymentScheme, Rejection};
use x402_core::timestamp::UnixTimestamp;

use super::types::{
    ExactSuiPayload, SuiAddress, SuiSignature, TransferData, normalize_coin_type, signing_digest,
};

/// Stateless verifier for coin transfers on any `sui` network.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactSuiScheme;

/// A decoded transfer, ready for the signature stage.
#[derive(Debug, Clone)]
pub struct SuiAuthorization {
    transfer: TransferData,
    raw_transaction: Vec<u8>,
    signature: Vec<u8>,
}

impl SuiAuthorization {
    /// The signed transfer.
    #[must_use]
    pub const fn transfer(&self) -> &TransferData {
        &self.transfer
    }
}

impl PaymentScheme for ExactSuiScheme {
    type Authorization = SuiAuthorization;

    fn scheme(&self) -> &str {
        EXACT_SCHEME
    }

    fn decode(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<SuiAuthorization, Rejection> {
        let decoded: ExactSuiPayload = serde_json::from_value(payload.payload.clone())
            .map_err(|e| Rejection::new(InvalidReason::InvalidPayload, e.to_string()))?;
        let raw_transaction = decoded.transaction.into_inner();
        let transfer = TransferData::from_bytes(&raw_transaction)
            .map_err(|e| Rejection::new(InvalidReason::InvalidPayload, e.to_string()))?;
        if transfer.network != requirements.network.reference() {
            return Err(Rejection::new(
                InvalidReason::NetworkMismatch,
                format!(
                    "transfer is for {}, expected {}",
                    transfer.network,
                    requirements.network.reference()
                ),
            ));
        }
        Ok(SuiAuthorization {
            transfer,
            raw_transaction,
            signature: decoded.signature.into_inner(),
        })
    }

    fn verify_signature(
        &self,
        _requirements: &PaymentRequirements,
        auth: &SuiAuthorization,
    ) -> Result<String, Rejection> {
        let signature = SuiSignature::parse(&auth.signature).ok_or_else(|| {
            Rejection::new(
                InvalidReason::MalformedSignature,
                format!(
                    "expected a 97 byte ed25519 signature, got {} bytes",
                    auth.signature.len()
                ),
            )
        })?;
        let sender = auth.transfer.sender;
        let signer = SuiAddress::from_public_key(&signature.public_key);
        if signer != sender {
            return Err(Rejection::new(
                InvalidReason::SignerMismatch,
                format!("key belongs to {signer}, sender is {sender}"),
            ));
        }
        signature
            .public_key
            .verify_strict(&signing_digest(&auth.raw_transaction), &signature.signature)
            .map_err(|_| {
                Rejection::new(
                    InvalidReason::SignerMismatch,
                    format!("signature does not verify for {sender}"),
                )
            })?;
        Ok(sender.to_string())
    }

    fn match_requirements(
        &self,
        requirements: &PaymentRequirements,
        auth: &SuiAuthorization,
    ) -> Result<(), Rejection> {
        let transfer = &auth.transfer;
        let pay_to = requirements
            .pay_to
            .parse::<SuiAddress>()
            .map_err(|e| Rejection::new(InvalidReason::InvalidRequirements, e.to_string()))?;

        if normalize_coin_type(&transfer.coin_type) != normalize_coin_type(&requirements.asset) {
            return Err(Rejection::new(
                InvalidReason::AssetMismatch,
                format!("transfers {}, expected {}", transfer.coin_type, requirements.asset),
            ));
        }
        if transfer.recipient != pay_to {
            return Err(Rejection::new(
                InvalidReason::RecipientMismatch,
                format!("pays {}, expected {pay_to}", transfer.recipient),
            ));
        }
        if TokenAmount::from(transfer.amount) != requirements.max_amount_required {
            return Err(Rejection::new(
                InvalidReason::AmountMismatch,
                format!(
                    "transfers {}, expected exactly {}",
                    transfer.amount, requirements.max_amount_required
                ),
            ));
        }
        if transfer.resource != requirements.resource {
            return Err(Rejection::new(
                InvalidReason::ResourceMismatch,
                format!(
                    "signed for {:?}, expected {:?}",
                    transfer.resource, requirements.resource
                ),
            ));
        }
        Ok(())
    }

    fn check_window(&self, auth: &SuiAuthorization, now: UnixTimestamp) -> Result<(), Rejection> {
        let expiration = UnixTimestamp::from_secs(auth.transfer.expiration);
        if expiration.is_expired_at(now) {
            return Err(Rejection::new(
                InvalidReason::Expired,
                format!("expired at {expiration}, now {now}"),
            ));
        }
        Ok(())
    }

    fn fingerprint(&self, requirements: &PaymentRequirements, auth: &SuiAuthorization) -> Fingerprint {
        let coin = &auth.transfer.coin;
        Fingerprint::derive(&[
            EXACT_SCHEME.as_bytes(),
            requirements.network.to_string().as_bytes(),
            auth.transfer.sender.as_bytes(),
            coin.object_id.as_bytes(),
            &coin.version.to_be_bytes(),
            &auth.transfer.nonce,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use serde_json::json;
    use x402_core::chain::ChainId;
    use x402_core::encoding::Base64Bytes;
    use x402_core::proto::X402Version;
    use x402_core::scheme::SchemeFacilitator;

    use crate::exact::types::ObjectRef;

    const NOW: UnixTimestamp = UnixTimestamp::from_secs(1_700_000_000);
    const PAY_TO: &str = "0x7d20dcdb2bca4f508ea9613994683eb4e76e9c4ed371169677c1be02aaf0b58e";

    fn requirements() -> PaymentRequirements {
        PaymentRequirements::builder("exact", ChainId::new("sui", "testnet"))
            .amount(1000)
            .asset("0x2::sui::SUI")
            .pay_to(PAY_TO)
            .resource("/premium")
            .max_timeout_seconds(60)
            .build()
            .unwrap()
    }

    fn transfer(key: &SigningKey) -> TransferData {
        TransferData {
            network: "testnet".into(),
            sender: SuiAddress::from_public_key(&key.verifying_key()),
            recipient: PAY_TO.parse().unwrap(),
            coin_type: format!("0x{}2::sui::SUI", "0".repeat(63)),
            coin: ObjectRef {
                object_id: "0xc0ffee".parse().unwrap(),
                version: 7,
                digest: [9; 32],
            },
            amount: 1000,
            resource: "/premium".into(),
            nonce: [3; 32],
            expiration: NOW.as_secs() + 60,
        }
    }

    fn sign(key: &SigningKey, transfer: &TransferData) -> PaymentPayload {
        let bytes = transfer.to_bytes().unwrap();
        let signature = SuiSignature {
            signature: key.sign(&signing_digest(&bytes)),
            public_key: key.verifying_key(),
        };
        let payload = ExactSuiPayload {
            transaction: Base64Bytes(bytes),
            signature: Base64Bytes(signature.to_bytes()),
        };
        PaymentPayload {
            x402_version: X402Version::V1,
            scheme: "exact".into(),
            network: requirements().network,
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
    fn test_signed_transfer_is_valid() {
        let key = SigningKey::from_bytes(&[1; 32]);
        let validated = ExactSuiScheme
            .validate(&requirements(), &sign(&key, &transfer(&key)), NOW)
            .unwrap();
        assert_eq!(
            validated.payer,
            SuiAddress::from_public_key(&key.verifying_key()).to_string()
        );
    }

    #[test]
    fn test_mismatches_carry_the_payer() {
        let key = SigningKey::from_bytes(&[1; 32]);
        let cases: [(fn(&mut TransferData), InvalidReason); 5] = [
            (|t| t.coin_type = "0x3::coin::X".into(), InvalidReason::AssetMismatch),
            (|t| t.recipient = SuiAddress([5; 32]), InvalidReason::RecipientMismatch),
            (|t| t.amount = 1001, InvalidReason::AmountMismatch),
            (|t| t.resource = "/other".into(), InvalidReason::ResourceMismatch),
            (|t| t.expiration = NOW.as_secs(), InvalidReason::Expired),
        ];
        for (tamper, expected) in cases {
            let mut transfer = transfer(&key);
            tamper(&mut transfer);
            let rejection = ExactSuiScheme
                .validate(&requirements(), &sign(&key, &transfer), NOW)
                .unwrap_err();
            assert_eq!(rejection.reason, expected);
            assert!(rejection.payer.is_some());
        }
    }

    #[test]
    fn test_sender_must_own_the_key() {
        let key = SigningKey::from_bytes(&[1; 32]);
        let other = SigningKey::from_bytes(&[2; 32]);
        let payload = sign(&other, &transfer(&key));
        assert_eq!(
            reason(ExactSuiScheme.validate(&requirements(), &payload, NOW)),
            InvalidReason::SignerMismatch
        );
    }

    #[test]
    fn test_tampered_transaction_fails_verification() {
        let key = SigningKey::from_bytes(&[1; 32]);
        let signed = sign(&key, &transfer(&key));
        let mut altered = transfer(&key);
        altered.nonce = [4; 32];
        let mut payload = sign(&key, &altered);
        payload.payload["signature"] = signed.payload["signature"].clone();
        assert_eq!(
            reason(ExactSuiScheme.validate(&requirements(), &payload, NOW)),
            InvalidReason::SignerMismatch
        );
    }

    #[test]
    fn test_structural_failures() {
        let key = SigningKey::from_bytes(&[1; 32]);
        let mut payload = sign(&key, &transfer(&key));
        payload.payload["signature"] = json!("AAEC");
        assert_eq!(
            reason(ExactSuiScheme.validate(&requirements(), &payload, NOW)),
            InvalidReason::MalformedSignature
        );

        payload.payload["transaction"] = json!("AAEC");
        assert_eq!(
            reason(ExactSuiScheme.validate(&requirements(), &payload, NOW)),
            InvalidReason::InvalidPayload
        );

        let mut mainnet = transfer(&key);
        mainnet.network = "mainnet".into();
        assert_eq!(
            reason(ExactSuiScheme.validate(&requirements(), &sign(&key, &mainnet), NOW)),
            InvalidReason::NetworkMismatch
        );
    }

    #[test]
    fn test_fingerprint_tracks_coin_version() {
        let key = SigningKey::from_bytes(&[1; 32]);
        let a = ExactSuiScheme
            .validate(&requirements(), &sign(&key, &transfer(&key)), NOW)
            .unwrap();
        let mut next = transfer(&key);
        next.coin.version = 8;
        let b = ExactSuiScheme
            .validate(&requirements(), &sign(&key, &next), NOW)
            .unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);
    }
}
