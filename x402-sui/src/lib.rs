#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Object-model (`sui:*`) chain support for the x402 payment engine.
//!
//! The payer signs a BCS-encoded [`TransferData`](exact::TransferData) that
//! spends one owned coin object. The signature follows the chain's own
//! convention: ed25519 over the blake2b-256 digest of an intent-prefixed
//! message, carried as `flag || signature || public key`.
//!
//! # Feature Flags
//!
//! - `client` - Payment signing through [`SuiSigner`](exact::client::SuiSigner)
//! - `telemetry` - Tracing instrumentation in the core engine

pub mod exact;
pub mod networks;

pub use exact::ExactSuiScheme;
#[cfg(feature = "client")]
pub use exact::client::{ExactSuiClient, SuiSigner};

/// CAIP-2 namespace of object-model chains.
pub const NAMESPACE: &str = x402_core::chain::SUI_NAMESPACE;
