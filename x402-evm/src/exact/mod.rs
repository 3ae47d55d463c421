//! EVM "exact" payment scheme.
//!
//! Uses ERC-3009 `transferWithAuthorization`: the payer signs an EIP-712
//! message and the facilitator submits it, paying gas on the payer's behalf.

#[cfg(feature = "client")]
pub mod client;
mod facilitator;
mod signature;
pub mod types;

pub use facilitator::{EvmAuthorization, ExactEvmScheme};
pub use types::*;
