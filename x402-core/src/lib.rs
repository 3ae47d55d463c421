#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Protocol engine for the x402 payment protocol.
//!
//! A resource server answers an unpaid request with HTTP 402 and a list of
//! [`PaymentRequirements`](proto::PaymentRequirements). The client signs a
//! chain-specific authorization and sends it back as a
//! [`PaymentPayload`](proto::PaymentPayload). This crate holds everything that
//! happens in between, independent of any chain:
//!
//! - [`proto`] - Wire types, reasons, version negotiation and the header codec
//! - [`chain`] - CAIP-2 chain identifiers and per-family address syntax
//! - [`networks`] - Human-readable network names mapped to chain identifiers
//! - [`scheme`] - Scheme traits, the [`SchemeRegistry`](scheme::SchemeRegistry) and client-side payment selection
//! - [`verify`] - The staged, pure [`VerificationEngine`](verify::VerificationEngine)
//! - [`settle`] - The idempotent [`SettlementEngine`](settle::SettlementEngine) and the chain-access interface
//! - [`facilitator`] - The [`Facilitator`](facilitator::Facilitator) trait and its local implementation
//! - [`server`] - [`PaymentGate`](server::PaymentGate), the resource-server side of the exchange
//!
//! Chain families live in sibling crates (`x402-evm`, `x402-svm`, `x402-sui`)
//! and plug in through [`scheme::PaymentScheme`] and [`settle::ChainClient`].
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod amount;
pub mod chain;
pub mod encoding;
pub mod facilitator;
pub mod networks;
pub mod proto;
pub mod scheme;
pub mod server;
pub mod settle;
pub mod timestamp;
pub mod verify;

#[cfg(test)]
mod testing;
