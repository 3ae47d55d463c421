//! x402 facilitator server.
//!
//! Exposes a [`LocalFacilitator`](x402_core::facilitator::LocalFacilitator)
//! over HTTP: `POST /verify`, `POST /settle`, `GET /supported` and
//! `GET /health`.
//!
//! # Modules
//!
//! - [`config`] - TOML configuration with environment variable expansion
//! - [`schemes`] - Scheme and chain registries built from the configuration
//! - [`handlers`] - Axum route handlers and router builder
//! - [`error`] - Error responses
//!
//! # Feature Flags
//!
//! - `chain-eip155` - EVM chains, with on-chain settlement
//! - `chain-solana` - Account-model chains (verification)
//! - `chain-sui` - Object-model chains (verification)
//! - `telemetry` - Tracing spans in the engines

pub mod config;
pub mod error;
pub mod handlers;
pub mod schemes;

pub use config::FacilitatorConfig;
pub use handlers::{FacilitatorState, facilitator_router};
pub use schemes::build_facilitator;
