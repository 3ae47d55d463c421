//! Server-side verification stages for the account-model "exact" scheme.

use serde_json::{Value, json};
use solana_signature::Signature;
use x402_core::amount::TokenAmount;
use x402_core::chain::ChainId;
use x402_core::proto::{InvalidReason, PaymentPayload, PaymentRequirements};
use x402_core::scheme::{EXACT_SCHEME, Fingerprint, PaymentScheme, Rejection};
use x402_core::timestamp::UnixTimestamp;

use super::types::{
    AccountKey, ExactSvmPayload, SvmExtra, TransferMessage, is_token_program, signing_bytes,
};

/// Verifier for signed transfer messages on any `solana` network.
///
/// When built [`with_fee_payer`](Self::with_fee_payer), the fee payer is
/// advertised through `/supported` so clients can name it in their messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactSvmScheme {
    fee_payer: Option<AccountKey>,
}

impl ExactSvmScheme {
    /// A verifier that advertises no fee payer.
    #[must_use]
    pub const fn new() -> Self {
        Self { fee_payer: None }
    }

    /// Advertises `fee_payer` as the account paying transaction fees.
    #[must_use]
    pub const fn with_fee_payer(mut self, fee_payer: AccountKey) -> Self {
        self.fee_payer = Some(fee_payer);
        self
    }
}

/// A decoded transfer message, ready for the signature stage.
#[derive(Debug, Clone)]
pub struct SvmAuthorization {
    message: TransferMessage,
    raw_message: Vec<u8>,
    signature: Signature,
    extra: SvmExtra,
}

impl SvmAuthorization {
    /// The signed transfer.
    #[must_use]
    pub const fn message(&self) -> &TransferMessage {
        &self.message
    }
}

fn invalid_payload<E: ToString>(e: E) -> Rejection {
    Rejection::new(InvalidReason::InvalidPayload, e.to_string())
}

fn parse_key(value: &str, field: &str) -> Result<AccountKey, Rejection> {
    value
        .parse::<AccountKey>()
        .map_err(|e| Rejection::new(InvalidReason::InvalidRequirements, format!("{field}: {e}")))
}

impl PaymentScheme for ExactSvmScheme {
    type Authorization = SvmAuthorization;

    fn scheme(&self) -> &str {
        EXACT_SCHEME
    }

    fn decode(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<SvmAuthorization, Rejection> {
        let extra = requirements
            .extra_as::<SvmExtra>()
            .map_err(|e| Rejection::new(InvalidReason::InvalidRequirements, e.to_string()))?
            .unwrap_or_default();
        let decoded: ExactSvmPayload =
            serde_json::from_value(payload.payload.clone()).map_err(invalid_payload)?;
        let raw_message = decoded.message.0;
        let message = TransferMessage::from_bytes(&raw_message).map_err(invalid_payload)?;

        if message.cluster != requirements.network.reference() {
            return Err(Rejection::new(
                InvalidReason::NetworkMismatch,
                format!(
                    "message is for cluster {}, expected {}",
                    message.cluster,
                    requirements.network.reference()
                ),
            ));
        }
        if !is_token_program(&message.program_id) {
            return Err(Rejection::new(
                InvalidReason::InvalidPayload,
                format!("{} is not a token program", message.program_id),
            ));
        }

        let signature = bs58::decode(&decoded.signature)
            .into_vec()
            .ok()
            .and_then(|bytes| <[u8; 64]>::try_from(bytes).ok())
            .map(Signature::from)
            .ok_or_else(|| {
                Rejection::new(
                    InvalidReason::MalformedSignature,
                    "expected a base58 64 byte ed25519 signature",
                )
            })?;

        Ok(SvmAuthorization {
            message,
            raw_message,
            signature,
            extra,
        })
    }

    fn verify_signature(
        &self,
        _requirements: &PaymentRequirements,
        auth: &SvmAuthorization,
    ) -> Result<String, Rejection> {
        let authority = auth.message.authority;
        let signed = signing_bytes(&auth.raw_message);
        if !auth.signature.verify(authority.as_bytes(), &signed) {
            return Err(Rejection::new(
                InvalidReason::SignerMismatch,
                format!("signature is not by {authority}"),
            ));
        }
        Ok(authority.to_string())
    }

    fn match_requirements(
        &self,
        requirements: &PaymentRequirements,
        auth: &SvmAuthorization,
    ) -> Result<(), Rejection> {
        let message = &auth.message;
        let asset = parse_key(&requirements.asset, "asset")?;
        let pay_to = parse_key(&requirements.pay_to, "payTo")?;

        if message.mint != asset {
            return Err(Rejection::new(
                InvalidReason::AssetMismatch,
                format!("transfers mint {}, expected {asset}", message.mint),
            ));
        }
        if let Some(program) = auth.extra.token_program
            && program != message.program_id
        {
            return Err(Rejection::new(
                InvalidReason::AssetMismatch,
                format!("transfers through {}, expected {program}", message.program_id),
            ));
        }
        if message.destination_owner != pay_to {
            return Err(Rejection::new(
                InvalidReason::RecipientMismatch,
                format!("pays {}, expected {pay_to}", message.destination_owner),
            ));
        }
        if TokenAmount::from(message.amount) != requirements.max_amount_required {
            return Err(Rejection::new(
                InvalidReason::AmountMismatch,
                format!(
                    "transfers {}, expected exactly {}",
                    message.amount, requirements.max_amount_required
                ),
            ));
        }
        if message.resource != requirements.resource {
            return Err(Rejection::new(
                InvalidReason::ResourceMismatch,
                format!(
                    "signed for {:?}, expected {:?}",
                    message.resource, requirements.resource
                ),
            ));
        }
        if let Some(decimals) = auth.extra.decimals
            && decimals != message.decimals
        {
            return Err(Rejection::new(
                InvalidReason::InvalidPayload,
                format!("declares {} decimals, mint has {decimals}", message.decimals),
            ));
        }
        if let Some(fee_payer) = auth.extra.fee_payer
            && fee_payer != message.fee_payer
        {
            return Err(Rejection::new(
                InvalidReason::InvalidPayload,
                format!("fee payer {} is not {fee_payer}", message.fee_payer),
            ));
        }
        Ok(())
    }

    fn check_window(&self, auth: &SvmAuthorization, now: UnixTimestamp) -> Result<(), Rejection> {
        let valid_until = UnixTimestamp::from_secs(auth.message.valid_until);
        if valid_until.is_expired_at(now) {
            return Err(Rejection::new(
                InvalidReason::Expired,
                format!("valid until {valid_until}, now {now}"),
            ));
        }
        Ok(())
    }

    fn fingerprint(&self, requirements: &PaymentRequirements, auth: &SvmAuthorization) -> Fingerprint {
        Fingerprint::derive(&[
            EXACT_SCHEME.as_bytes(),
            requirements.network.to_string().as_bytes(),
            auth.message.mint.as_bytes(),
            auth.message.authority.as_bytes(),
            &auth.message.nonce,
        ])
    }

    fn supported_extra(&self, _network: &ChainId) -> Option<Value> {
        self.fee_payer
            .map(|fee_payer| json!({ "feePayer": fee_payer.to_string() }))
    }
}
