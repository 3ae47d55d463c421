//! The "exact" scheme on object-model chains.

#[cfg(feature = "client")]
pub mod client;
mod facilitator;
pub mod types;

pub use facilitator::{ExactSuiScheme, SuiAuthorization};
pub use types::*;
