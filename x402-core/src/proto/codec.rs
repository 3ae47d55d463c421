//! Header codec: JSON objects wrapped in standard base64.
//!
//! Decoding inspects `x402Version` before the typed parse, so a payload from
//! a newer protocol fails with [`DecodeError::UnsupportedVersion`] instead of
//! whatever field error its new shape would trigger.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{PaymentPayload, PaymentRequired, SettlementResult, X402Version};

/// Reasons a wire string cannot be turned back into a protocol value.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The header is not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes are not the expected JSON object.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The object carries no integer `x402Version`.
    #[error("missing or non-integer x402Version")]
    MissingVersion,
    /// The object declares a version this engine does not decode.
    #[error("unsupported x402Version {0}")]
    UnsupportedVersion(X402Version),
}

fn encode_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(b64.encode(json))
}

fn decode_json(wire: &str) -> Result<Value, DecodeError> {
    let bytes = b64.decode(wire.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn decode_versioned<T: DeserializeOwned>(wire: &str) -> Result<T, DecodeError> {
    let value = decode_json(wire)?;
    let version = value
        .get("x402Version")
        .and_then(Value::as_u64)
        .map(X402Version)
        .ok_or(DecodeError::MissingVersion)?;
    if !version.is_supported() {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    Ok(serde_json::from_value(value)?)
}

/// Encodes a payload for the `X-PAYMENT` header.
///
/// # Errors
///
/// Returns a JSON error if serialization fails.
pub fn encode(payload: &PaymentPayload) -> Result<String, serde_json::Error> {
    encode_json(payload)
}

/// Decodes an `X-PAYMENT` header value.
///
/// # Errors
///
/// Returns [`DecodeError`] for bad base64, bad JSON, missing required fields,
/// or an unsupported `x402Version`.
pub fn decode(wire: &str) -> Result<PaymentPayload, DecodeError> {
    decode_versioned(wire)
}

/// Encodes a settlement result for the `X-PAYMENT-RESPONSE` header.
///
/// # Errors
///
/// Returns a JSON error if serialization fails.
pub fn encode_settlement(result: &SettlementResult) -> Result<String, serde_json::Error> {
    encode_json(result)
}

/// Decodes an `X-PAYMENT-RESPONSE` header value.
///
/// # Errors
///
/// Returns [`DecodeError`] for bad base64 or JSON.
pub fn decode_settlement(wire: &str) -> Result<SettlementResult, DecodeError> {
    Ok(serde_json::from_value(decode_json(wire)?)?)
}

/// Encodes a 402 body for header transport.
///
/// # Errors
///
/// Returns a JSON error if serialization fails.
pub fn encode_payment_required(required: &PaymentRequired) -> Result<String, serde_json::Error> {
    encode_json(required)
}

/// Decodes a base64-wrapped 402 body.
///
/// # Errors
///
/// Returns [`DecodeError`] for bad base64, bad JSON or an unsupported version.
pub fn decode_payment_required(wire: &str) -> Result<PaymentRequired, DecodeError> {
    decode_versioned(wire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainId;
    use crate::proto::{SettlementErrorReason, TransactionReference};
    use serde_json::json;

    fn payload() -> PaymentPayload {
        PaymentPayload {
            x402_version: X402Version::V1,
            scheme: "exact".into(),
            network: ChainId::new("eip155", "84532"),
            payload: json!({
                "signature": "0x1234",
                "authorization": {"from": "0xCD", "value": "1000"}
            }),
        }
    }

    fn wire(value: &Value) -> String {
        b64.encode(serde_json::to_vec(value).unwrap())
    }

    #[test]
    fn test_round_trip() {
        let original = payload();
        let encoded = encode(&original).unwrap();
        assert_eq!(decode(&encoded).unwrap(), original);
    }

    #[test]
    fn test_round_trip_of_dashed_network_is_canonical() {
        let value = json!({
            "x402Version": 1,
            "scheme": "exact",
            "network": "evm-84532",
            "payload": {}
        });
        let decoded = decode(&wire(&value)).unwrap();
        assert_eq!(decoded.network, ChainId::new("eip155", "84532"));
        assert_eq!(decode(&encode(&decoded).unwrap()).unwrap(), decoded);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let mut value = serde_json::to_value(payload()).unwrap();
        value["addedLater"] = json!([1, 2, 3]);
        assert_eq!(decode(&wire(&value)).unwrap(), payload());
    }

    #[test]
    fn test_missing_required_field_is_error() {
        let mut value = serde_json::to_value(payload()).unwrap();
        value.as_object_mut().unwrap().remove("scheme");
        assert!(matches!(decode(&wire(&value)), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_unsupported_version_is_distinct() {
        let mut value = serde_json::to_value(payload()).unwrap();
        value["x402Version"] = json!(2);
        assert!(matches!(
            decode(&wire(&value)),
            Err(DecodeError::UnsupportedVersion(X402Version(2)))
        ));

        value.as_object_mut().unwrap().remove("x402Version");
        assert!(matches!(
            decode(&wire(&value)),
            Err(DecodeError::MissingVersion)
        ));

        value["x402Version"] = json!("1");
        assert!(matches!(
            decode(&wire(&value)),
            Err(DecodeError::MissingVersion)
        ));
    }

    #[test]
    fn test_garbage_input() {
        assert!(matches!(decode("not base64!"), Err(DecodeError::Base64(_))));
        assert!(matches!(
            decode(&b64.encode("[1,2")),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_settlement_header_round_trip() {
        let result = SettlementResult::Failure {
            reason: SettlementErrorReason::Timeout,
            message: Some("no receipt".into()),
            payer: Some("0xCD".into()),
            transaction: Some(TransactionReference("0xfeed".into())),
            network: ChainId::new("eip155", "84532"),
        };
        let encoded = encode_settlement(&result).unwrap();
        assert_eq!(decode_settlement(&encoded).unwrap(), result);
    }
}
