#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EIP-155 (EVM) chain support for the x402 payment engine.
//!
//! Payments are ERC-3009 `transferWithAuthorization` messages signed with
//! EIP-712 against the token contract's domain. The authorization nonce is
//! derived from the protected resource and a random salt, which binds each
//! signature to exactly one resource.
//!
//! - [`exact`] - The "exact" scheme: payload types, staged verification and the client signer
//! - [`networks`] - Known EVM networks and their USDC deployments
//! - `provider` - [`EvmChainClient`], the alloy-backed chain adapter used for settlement
//!
//! # Feature Flags
//!
//! - `client` - Client-side payment signing
//! - `facilitator` - On-chain settlement through an RPC provider
//! - `telemetry` - Tracing instrumentation

pub mod exact;
pub mod networks;

#[cfg(feature = "facilitator")]
mod provider;

pub use exact::ExactEvmScheme;
#[cfg(feature = "client")]
pub use exact::client::{ExactEvmClient, SignerLike};
#[cfg(feature = "facilitator")]
pub use provider::{EvmChainClient, classify_revert};

/// CAIP-2 namespace of EVM chains.
pub const NAMESPACE: &str = x402_core::chain::EIP155_NAMESPACE;
