//! 402 responses and the headers of a paid response.

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use x402_core::proto::PaymentRequired;
use x402_core::server::Settled;

use crate::constants::{ACCESS_CONTROL_EXPOSE_HEADERS, X_PAYMENT_RESPONSE_HEADER};
use crate::error::HttpError;

/// A `402 Payment Required` response whose JSON body lists `accepts`.
///
/// # Errors
///
/// Returns [`HttpError`] if the body cannot be serialized.
pub fn payment_required_response(required: &PaymentRequired) -> Result<Response<String>, HttpError> {
    let body = serde_json::to_string(required)?;
    Ok(Response::builder()
        .status(StatusCode::PAYMENT_REQUIRED)
        .header(CONTENT_TYPE, "application/json")
        .body(body)?)
}

/// Headers to attach to the resource once `settled` went through.
///
/// `X-PAYMENT-RESPONSE` is exposed to browsers through CORS.
///
/// # Errors
///
/// Returns [`HttpError::HeaderValue`] if the encoded settlement is not a valid value.
pub fn paid_response_headers(settled: &Settled) -> Result<HeaderMap, HttpError> {
    let mut headers = HeaderMap::new();
    headers.insert(X_PAYMENT_RESPONSE_HEADER, HeaderValue::from_str(&settled.header)?);
    headers.insert(
        ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(X_PAYMENT_RESPONSE_HEADER),
    );
    Ok(headers)
}

/// The advertised requirements in a response, if it is a 402.
///
/// # Errors
///
/// [`HttpError::Json`] if a 402 body is not a [`PaymentRequired`].
pub fn parse_payment_required(
    status: StatusCode,
    body: &[u8],
) -> Result<Option<PaymentRequired>, HttpError> {
    if status != StatusCode::PAYMENT_REQUIRED {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(body)?))
}
