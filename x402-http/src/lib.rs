#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport for the x402 payment engine.
//!
//! # Modules
//!
//! - [`constants`] - Header names, status code, default facilitator URL
//! - [`headers`] - `X-PAYMENT` / `X-PAYMENT-RESPONSE` on an [`http::HeaderMap`]
//! - [`response`] - 402 responses and paid-response headers
//! - [`error`] - Transport error types
//! - [`facilitator_client`] - Remote facilitator over HTTP (feature: `client`)

pub mod constants;
pub mod error;
pub mod headers;
pub mod response;

#[cfg(feature = "client")]
pub mod facilitator_client;

pub use error::HttpError;
#[cfg(feature = "client")]
pub use facilitator_client::{FacilitatorClient, FacilitatorClientError};
