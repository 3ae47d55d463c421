//! Wire types of the x402 protocol.
//!
//! - [`PaymentRequirements`] - What a resource server accepts, one entry per way to pay
//! - [`PaymentPayload`] - A client's signed authorization for one requirements entry
//! - [`PaymentRequired`] - The 402 response body listing accepted requirements
//! - [`FacilitatorRequest`] - The body of `POST /verify` and `POST /settle`
//! - [`VerificationResult`] / [`SettlementResult`] - Verdicts returned to callers
//!
//! All types use camelCase JSON. Unknown fields are ignored on decode, so
//! newer peers can add fields without breaking this one.

pub mod codec;
pub mod reason;
pub mod version;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::amount::TokenAmount;
use crate::chain::{ChainFamily, ChainId};

pub use codec::DecodeError;
pub use reason::{InvalidReason, SettlementErrorReason};
pub use version::{SUPPORTED_VERSIONS, UnsupportedVersion, X402Version};

/// Server-declared terms a payment must satisfy to unlock a resource.
///
/// Build new requirements with [`PaymentRequirements::builder`], which
/// enforces the syntax rules of the chain family. Requirements decoded from
/// the wire are checked again by the verification engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment scheme identifier (e.g., `"exact"`).
    pub scheme: String,
    /// Chain the payment settles on.
    pub network: ChainId,
    /// Exact amount in the asset's smallest unit.
    pub max_amount_required: TokenAmount,
    /// Chain-specific asset identifier.
    pub asset: String,
    /// Destination address, chain-native format.
    pub pay_to: String,
    /// Identifier of the protected resource, bound into the authorization.
    pub resource: String,
    /// Upper bound on the facilitator's settlement wait.
    pub max_timeout_seconds: u64,
    /// Human-readable description of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// JSON schema of the resource's response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Scheme-specific parameters (token decimals, signing domain, fee payer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Reasons [`PaymentRequirements`] are rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequirementsError {
    /// The scheme identifier is empty.
    #[error("scheme must not be empty")]
    EmptyScheme,
    /// The network is a namespace pattern, not a concrete chain.
    #[error("network {0} is a pattern, not a chain")]
    WildcardNetwork(ChainId),
    /// `maxAmountRequired` is zero.
    #[error("maxAmountRequired must be greater than zero")]
    ZeroAmount,
    /// `maxTimeoutSeconds` is zero.
    #[error("maxTimeoutSeconds must be greater than zero")]
    ZeroTimeout,
    /// `payTo` is not an address of the network's family.
    #[error("payTo {value:?} is not a valid {family:?} address")]
    InvalidPayTo {
        /// Family of the requirements' network.
        family: ChainFamily,
        /// The rejected value.
        value: String,
    },
    /// `asset` is not an asset identifier of the network's family.
    #[error("asset {value:?} is not a valid {family:?} asset")]
    InvalidAsset {
        /// Family of the requirements' network.
        family: ChainFamily,
        /// The rejected value.
        value: String,
    },
    /// `extra` is present but not a JSON object.
    #[error("extra must be a JSON object")]
    ExtraNotObject,
}

impl PaymentRequirements {
    /// Starts building requirements for `scheme` on `network`.
    pub fn builder<S: Into<String>>(scheme: S, network: ChainId) -> RequirementsBuilder {
        RequirementsBuilder::new(scheme.into(), network)
    }

    /// Checks the construction invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule as a [`RequirementsError`].
    pub fn validate(&self) -> Result<(), RequirementsError> {
        if self.scheme.trim().is_empty() {
            return Err(RequirementsError::EmptyScheme);
        }
        if self.network.is_wildcard() {
            return Err(RequirementsError::WildcardNetwork(self.network.clone()));
        }
        if self.max_amount_required.is_zero() {
            return Err(RequirementsError::ZeroAmount);
        }
        if self.max_timeout_seconds == 0 {
            return Err(RequirementsError::ZeroTimeout);
        }
        let family = self.network.family();
        if !family.is_valid_address(&self.pay_to) {
            return Err(RequirementsError::InvalidPayTo {
                family,
                value: self.pay_to.clone(),
            });
        }
        if !family.is_valid_asset(&self.asset) {
            return Err(RequirementsError::InvalidAsset {
                family,
                value: self.asset.clone(),
            });
        }
        if self.extra.as_ref().is_some_and(|extra| !extra.is_object()) {
            return Err(RequirementsError::ExtraNotObject);
        }
        Ok(())
    }

    /// Deserializes `extra` into a scheme-specific type.
    ///
    /// Returns `Ok(None)` when no `extra` is present.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if `extra` does not match `T`.
    pub fn extra_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.extra
            .as_ref()
            .map(|extra| serde_json::from_value(extra.clone()))
            .transpose()
    }
}

/// Builder for [`PaymentRequirements`].
#[derive(Debug, Clone)]
pub struct RequirementsBuilder {
    inner: PaymentRequirements,
}

impl RequirementsBuilder {
    /// Default settlement window when none is given.
    pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 60;

    fn new(scheme: String, network: ChainId) -> Self {
        Self {
            inner: PaymentRequirements {
                scheme,
                network,
                max_amount_required: TokenAmount::ZERO,
                asset: String::new(),
                pay_to: String::new(),
                resource: String::new(),
                max_timeout_seconds: Self::DEFAULT_MAX_TIMEOUT_SECONDS,
                description: None,
                mime_type: None,
                output_schema: None,
                extra: None,
            },
        }
    }

    /// Sets `maxAmountRequired`.
    #[must_use]
    pub fn amount<A: Into<TokenAmount>>(mut self, amount: A) -> Self {
        self.inner.max_amount_required = amount.into();
        self
    }

    /// Sets `asset`.
    #[must_use]
    pub fn asset<S: Into<String>>(mut self, asset: S) -> Self {
        self.inner.asset = asset.into();
        self
    }

    /// Sets `payTo`.
    #[must_use]
    pub fn pay_to<S: Into<String>>(mut self, pay_to: S) -> Self {
        self.inner.pay_to = pay_to.into();
        self
    }

    /// Sets `resource`.
    #[must_use]
    pub fn resource<S: Into<String>>(mut self, resource: S) -> Self {
        self.inner.resource = resource.into();
        self
    }

    /// Sets `maxTimeoutSeconds`.
    #[must_use]
    pub const fn max_timeout_seconds(mut self, seconds: u64) -> Self {
        self.inner.max_timeout_seconds = seconds;
        self
    }

    /// Sets `description`.
    #[must_use]
    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.inner.description = Some(description.into());
        self
    }

    /// Sets `mimeType`.
    #[must_use]
    pub fn mime_type<S: Into<String>>(mut self, mime_type: S) -> Self {
        self.inner.mime_type = Some(mime_type.into());
        self
    }

    /// Sets `outputSchema`.
    #[must_use]
    pub fn output_schema(mut self, schema: Value) -> Self {
        self.inner.output_schema = Some(schema);
        self
    }

    /// Sets `extra`.
    #[must_use]
    pub fn extra(mut self, extra: Value) -> Self {
        self.inner.extra = Some(extra);
        self
    }

    /// Validates and returns the requirements.
    ///
    /// # Errors
    ///
    /// Returns [`RequirementsError`] if any construction invariant is violated.
    pub fn build(self) -> Result<PaymentRequirements, RequirementsError> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

/// A client's signed authorization, built against one requirements entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version of this payload.
    pub x402_version: X402Version,
    /// Scheme of the requirements entry this payload answers.
    pub scheme: String,
    /// Network of the requirements entry this payload answers.
    pub network: ChainId,
    /// Scheme-defined signed authorization.
    pub payload: Value,
}

/// Body of an HTTP 402 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Highest protocol version the server accepts.
    pub x402_version: X402Version,
    /// Requirements entries; the client may satisfy any one of them.
    pub accepts: Vec<PaymentRequirements>,
    /// Why the previous attempt, if any, was refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `POST /verify` and `POST /settle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorRequest {
    /// Protocol version of the request.
    pub x402_version: X402Version,
    /// The requirements entry the payload was built against.
    #[serde(alias = "paymentRequirements")]
    pub requirements: PaymentRequirements,
    /// The client's payload.
    #[serde(alias = "paymentPayload")]
    pub payload: PaymentPayload,
}

impl FacilitatorRequest {
    /// Pairs a payload with its requirements, taking the version from the payload.
    #[must_use]
    pub fn new(requirements: PaymentRequirements, payload: PaymentPayload) -> Self {
        Self {
            x402_version: payload.x402_version,
            requirements,
            payload,
        }
    }
}

/// Chain-native identifier of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionReference(pub String);

impl fmt::Display for TransactionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TransactionReference {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Outcome of verifying a payment.
///
/// On the wire:
///
/// ```json
/// {"isValid": false, "invalidReason": "AmountMismatch", "payer": "0x..."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "VerificationResultWire", try_from = "VerificationResultWire")]
pub enum VerificationResult {
    /// The payment satisfies the requirements.
    Valid {
        /// Address that signed the authorization.
        payer: String,
    },
    /// The payment was rejected at the first failing stage.
    Invalid {
        /// Stable reason code.
        reason: InvalidReason,
        /// Human-readable detail.
        message: Option<String>,
        /// The payer, once the signature stage has identified one.
        payer: Option<String>,
    },
}

impl VerificationResult {
    /// Whether the payment is valid.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// The payer, if identified.
    #[must_use]
    pub fn payer(&self) -> Option<&str> {
        match self {
            Self::Valid { payer } => Some(payer),
            Self::Invalid { payer, .. } => payer.as_deref(),
        }
    }

    /// The invalid reason, if any.
    #[must_use]
    pub const fn invalid_reason(&self) -> Option<InvalidReason> {
        match self {
            Self::Valid { .. } => None,
            Self::Invalid { reason, .. } => Some(*reason),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerificationResultWire {
    is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<InvalidReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
}

impl From<VerificationResult> for VerificationResultWire {
    fn from(value: VerificationResult) -> Self {
        match value {
            VerificationResult::Valid { payer } => Self {
                is_valid: true,
                invalid_reason: None,
                invalid_message: None,
                payer: Some(payer),
            },
            VerificationResult::Invalid {
                reason,
                message,
                payer,
            } => Self {
                is_valid: false,
                invalid_reason: Some(reason),
                invalid_message: message,
                payer,
            },
        }
    }
}

impl TryFrom<VerificationResultWire> for VerificationResult {
    type Error = String;

    fn try_from(wire: VerificationResultWire) -> Result<Self, Self::Error> {
        if wire.is_valid {
            let payer = wire.payer.ok_or("valid result is missing payer")?;
            Ok(Self::Valid { payer })
        } else {
            let reason = wire
                .invalid_reason
                .ok_or("invalid result is missing invalidReason")?;
            Ok(Self::Invalid {
                reason,
                message: wire.invalid_message,
                payer: wire.payer,
            })
        }
    }
}

/// Outcome of settling a payment.
///
/// On the wire:
///
/// ```json
/// {"success": true, "transactionReference": "0x...", "network": "eip155:84532", "payer": "0x..."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "SettlementResultWire", try_from = "SettlementResultWire")]
pub enum SettlementResult {
    /// The transfer landed on-chain.
    Success {
        /// Address that paid.
        payer: String,
        /// The settling transaction.
        transaction: TransactionReference,
        /// Network it settled on.
        network: ChainId,
    },
    /// The transfer did not land, or its outcome is not known yet.
    Failure {
        /// Stable reason code.
        reason: SettlementErrorReason,
        /// Human-readable detail.
        message: Option<String>,
        /// Address that would have paid, if known.
        payer: Option<String>,
        /// A transaction that was submitted, if any.
        transaction: Option<TransactionReference>,
        /// Network the settlement targeted.
        network: ChainId,
    },
}

impl SettlementResult {
    /// Builds a failure with only a reason and message.
    pub fn failure<M: Into<String>>(
        reason: SettlementErrorReason,
        message: M,
        network: ChainId,
    ) -> Self {
        Self::Failure {
            reason,
            message: Some(message.into()),
            payer: None,
            transaction: None,
            network,
        }
    }

    /// Whether the transfer landed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The failure reason, if any.
    #[must_use]
    pub const fn error_reason(&self) -> Option<SettlementErrorReason> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { reason, .. } => Some(*reason),
        }
    }

    /// The settling or submitted transaction, if any.
    #[must_use]
    pub const fn transaction(&self) -> Option<&TransactionReference> {
        match self {
            Self::Success { transaction, .. } => Some(transaction),
            Self::Failure { transaction, .. } => transaction.as_ref(),
        }
    }

    /// The network the settlement targeted.
    #[must_use]
    pub const fn network(&self) -> &ChainId {
        match self {
            Self::Success { network, .. } | Self::Failure { network, .. } => network,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettlementResultWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<SettlementErrorReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, alias = "transaction", skip_serializing_if = "Option::is_none")]
    transaction_reference: Option<TransactionReference>,
    network: ChainId,
}

impl From<SettlementResult> for SettlementResultWire {
    fn from(value: SettlementResult) -> Self {
        match value {
            SettlementResult::Success {
                payer,
                transaction,
                network,
            } => Self {
                success: true,
                error_reason: None,
                error_message: None,
                payer: Some(payer),
                transaction_reference: Some(transaction),
                network,
            },
            SettlementResult::Failure {
                reason,
                message,
                payer,
                transaction,
                network,
            } => Self {
                success: false,
                error_reason: Some(reason),
                error_message: message,
                payer,
                transaction_reference: transaction,
                network,
            },
        }
    }
}

impl TryFrom<SettlementResultWire> for SettlementResult {
    type Error = String;

    fn try_from(wire: SettlementResultWire) -> Result<Self, Self::Error> {
        if wire.success {
            Ok(Self::Success {
                payer: wire.payer.ok_or("successful settlement is missing payer")?,
                transaction: wire
                    .transaction_reference
                    .ok_or("successful settlement is missing transactionReference")?,
                network: wire.network,
            })
        } else {
            Ok(Self::Failure {
                reason: wire
                    .error_reason
                    .ok_or("failed settlement is missing errorReason")?,
                message: wire.error_message,
                payer: wire.payer,
                transaction: wire.transaction_reference,
                network: wire.network,
            })
        }
    }
}

/// One (version, scheme, network) combination a facilitator handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    /// Protocol version.
    pub x402_version: X402Version,
    /// Scheme identifier.
    pub scheme: String,
    /// Network, or a `namespace:*` pattern.
    pub network: ChainId,
    /// Scheme-specific parameters clients need (e.g., a fee payer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Body of `GET /supported`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    /// Every supported combination.
    pub kinds: Vec<SupportedKind>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_sepolia() -> ChainId {
        ChainId::new("eip155", "84532")
    }

    fn builder() -> RequirementsBuilder {
        PaymentRequirements::builder("exact", base_sepolia())
            .amount(1000)
            .asset("0x036CbD53842c5426634e7929541eC2318f3dCF7e")
            .pay_to("0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B")
            .resource("/premium")
            .max_timeout_seconds(60)
    }

    #[test]
    fn test_builder_accepts_valid_requirements() {
        let requirements = builder().build().unwrap();
        assert_eq!(requirements.max_amount_required, TokenAmount::from(1000));
        assert_eq!(requirements.resource, "/premium");
    }

    #[test]
    fn test_builder_rejects_zero_amount() {
        assert_eq!(
            builder().amount(0).build().unwrap_err(),
            RequirementsError::ZeroAmount
        );
    }

    #[test]
    fn test_builder_rejects_foreign_address_syntax() {
        let err = builder()
            .pay_to("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU")
            .build()
            .unwrap_err();
        assert!(matches!(err, RequirementsError::InvalidPayTo { .. }));

        let err = builder().asset("0xUSDC").build().unwrap_err();
        assert!(matches!(err, RequirementsError::InvalidAsset { .. }));
    }

    #[test]
    fn test_builder_rejects_pattern_network_and_scalar_extra() {
        let err = PaymentRequirements::builder("exact", ChainId::wildcard("eip155"))
            .amount(1)
            .build()
            .unwrap_err();
        assert!(matches!(err, RequirementsError::WildcardNetwork(_)));

        let err = builder().extra(json!("USDC")).build().unwrap_err();
        assert_eq!(err, RequirementsError::ExtraNotObject);
    }

    #[test]
    fn test_requirements_wire_is_camel_case() {
        let requirements = builder().extra(json!({"name": "USDC", "version": "2"})).build().unwrap();
        let value = serde_json::to_value(&requirements).unwrap();
        assert_eq!(value["maxAmountRequired"], "1000");
        assert_eq!(value["payTo"], "0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B");
        assert_eq!(value["maxTimeoutSeconds"], 60);
        assert_eq!(value["network"], "eip155:84532");
        assert!(value.get("description").is_none());
    }

    #[test]
    fn test_requirements_ignore_unknown_fields() {
        let mut value = serde_json::to_value(builder().build().unwrap()).unwrap();
        value["futureField"] = json!({"nested": true});
        let decoded: PaymentRequirements = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, builder().build().unwrap());
    }

    #[test]
    fn test_verification_result_wire() {
        let invalid = VerificationResult::Invalid {
            reason: InvalidReason::AmountMismatch,
            message: None,
            payer: None,
        };
        assert_eq!(
            serde_json::to_value(&invalid).unwrap(),
            json!({"isValid": false, "invalidReason": "AmountMismatch"})
        );
        let valid: VerificationResult =
            serde_json::from_value(json!({"isValid": true, "payer": "0xCD"})).unwrap();
        assert_eq!(valid.payer(), Some("0xCD"));
        assert!(serde_json::from_value::<VerificationResult>(json!({"isValid": false})).is_err());
    }

    #[test]
    fn test_settlement_result_wire() {
        let success = SettlementResult::Success {
            payer: "0xCD".into(),
            transaction: TransactionReference("0xabc".into()),
            network: base_sepolia(),
        };
        assert_eq!(
            serde_json::to_value(&success).unwrap(),
            json!({
                "success": true,
                "payer": "0xCD",
                "transactionReference": "0xabc",
                "network": "eip155:84532"
            })
        );
        let aliased: SettlementResult = serde_json::from_value(json!({
            "success": true,
            "payer": "0xCD",
            "transaction": "0xabc",
            "network": "eip155:84532"
        }))
        .unwrap();
        assert_eq!(aliased, success);
    }

    #[test]
    fn test_facilitator_request_accepts_long_field_names() {
        let requirements = builder().build().unwrap();
        let payload = PaymentPayload {
            x402_version: X402Version::V1,
            scheme: "exact".into(),
            network: base_sepolia(),
            payload: json!({}),
        };
        let body = json!({
            "x402Version": 1,
            "paymentRequirements": requirements,
            "paymentPayload": payload,
        });
        let request: FacilitatorRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request, FacilitatorRequest::new(requirements, payload));
    }
}
