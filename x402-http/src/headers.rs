//! `X-PAYMENT` and `X-PAYMENT-RESPONSE` on an [`HeaderMap`].
//!
//! Values are the codec's base64 JSON. A missing header is `Ok(None)`; a
//! present but undecodable one is an error, so callers can answer 402 with
//! the reason instead of treating it as "no payment".

use http::{HeaderMap, HeaderValue};
use x402_core::proto::codec;
use x402_core::proto::{PaymentPayload, SettlementResult};

use crate::constants::{X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER};
use crate::error::HttpError;

/// Raw text of `name`, if present.
///
/// # Errors
///
/// [`HttpError::NotAscii`] if the value holds opaque bytes.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, HttpError> {
    headers
        .get(name)
        .map(|value| value.to_str().map_err(|_| HttpError::NotAscii(name)))
        .transpose()
}

/// Encodes `payload` as an `X-PAYMENT` value.
///
/// # Errors
///
/// Returns [`HttpError`] if serialization fails.
pub fn encode_x_payment(payload: &PaymentPayload) -> Result<HeaderValue, HttpError> {
    Ok(HeaderValue::from_str(&codec::encode(payload)?)?)
}

/// Decodes the request's `X-PAYMENT` header.
///
/// # Errors
///
/// [`HttpError::Decode`] for malformed or unsupported-version payloads.
pub fn decode_x_payment(headers: &HeaderMap) -> Result<Option<PaymentPayload>, HttpError> {
    header_str(headers, X_PAYMENT_HEADER)?
        .map(|wire| {
            codec::decode(wire).map_err(|source| HttpError::Decode {
                header: X_PAYMENT_HEADER,
                source,
            })
        })
        .transpose()
}

/// Encodes `settlement` as an `X-PAYMENT-RESPONSE` value.
///
/// # Errors
///
/// Returns [`HttpError`] if serialization fails.
pub fn encode_x_payment_response(settlement: &SettlementResult) -> Result<HeaderValue, HttpError> {
    Ok(HeaderValue::from_str(&codec::encode_settlement(settlement)?)?)
}

/// Decodes the response's `X-PAYMENT-RESPONSE` header.
///
/// # Errors
///
/// [`HttpError::Decode`] if the value is not an encoded settlement.
pub fn decode_x_payment_response(headers: &HeaderMap) -> Result<Option<SettlementResult>, HttpError> {
    header_str(headers, X_PAYMENT_RESPONSE_HEADER)?
        .map(|wire| {
            codec::decode_settlement(wire).map_err(|source| HttpError::Decode {
                header: X_PAYMENT_RESPONSE_HEADER,
                source,
            })
        })
        .transpose()
}
