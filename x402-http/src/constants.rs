//! HTTP-specific constants for the x402 protocol.

/// Header carrying the client's payment payload.
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// Header carrying the settlement result back to the client.
pub const X_PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// CORS header name for exposing custom headers.
pub const ACCESS_CONTROL_EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";

/// HTTP 402 Payment Required status code.
pub const HTTP_STATUS_PAYMENT_REQUIRED: u16 = 402;

/// Default facilitator address, matching the facilitator binary's defaults.
pub const DEFAULT_FACILITATOR_URL: &str = "http://localhost:4021/";
