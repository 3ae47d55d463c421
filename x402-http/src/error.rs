//! Error types for the HTTP transport layer.

use x402_core::proto::codec::DecodeError;

/// Errors that can occur while moving x402 messages through HTTP.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A header value did not decode.
    #[error("invalid {header} header: {source}")]
    Decode {
        /// Header name.
        header: &'static str,
        /// The codec error.
        #[source]
        source: DecodeError,
    },

    /// A header holds non-visible-ASCII bytes.
    #[error("{0} header is not visible ASCII")]
    NotAscii(&'static str),

    /// An encoded value cannot be a header value.
    #[error("invalid header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    /// The response could not be assembled.
    #[error("failed to build response: {0}")]
    Response(#[from] http::Error),
}
