//! The "exact" scheme on account-model chains.
//!
//! A payment is a [`TransferMessage`] describing one `TransferChecked`
//! instruction, signed by the source owner with ed25519.

#[cfg(feature = "client")]
pub mod client;
mod facilitator;
pub mod types;

pub use facilitator::{ExactSvmScheme, SvmAuthorization};
pub use types::*;
