#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Account-model (`solana:*`) chain support for the x402 payment engine.
//!
//! The payer signs a compact transfer message describing a
//! `TransferChecked` instruction of the SPL Token (or Token-2022) program.
//! The message is bincode-encoded and signed with ed25519 under a fixed
//! domain prefix, so a signature over it can never be replayed as a
//! transaction signature. Submitting the resulting transfer is left to a
//! [`ChainClient`](x402_core::settle::ChainClient) supplied by the deployment.
//!
//! # Feature Flags
//!
//! - `client` - Payment signing with any `solana_signer::Signer`
//! - `telemetry` - Tracing instrumentation in the core engine

pub mod exact;
pub mod networks;

pub use exact::ExactSvmScheme;
#[cfg(feature = "client")]
pub use exact::client::ExactSvmClient;

/// CAIP-2 namespace of account-model chains.
pub const NAMESPACE: &str = x402_core::chain::SOLANA_NAMESPACE;
