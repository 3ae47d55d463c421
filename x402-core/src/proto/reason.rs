//! Stable reason codes for invalid payments and failed settlements.
//!
//! These are the values callers branch on, so they serialize as fixed
//! PascalCase strings and never carry chain-specific text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a payment failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidReason {
    /// The payload declares an `x402Version` this engine does not accept.
    UnsupportedVersion,
    /// The requirements themselves are malformed for their chain family.
    InvalidRequirements,
    /// The scheme payload is structurally malformed.
    InvalidPayload,
    /// The payload's scheme does not echo the requirements' scheme.
    SchemeMismatch,
    /// The payload's network does not echo the requirements' network.
    NetworkMismatch,
    /// No scheme is registered for the (scheme, network) pair.
    SchemeNotFound,
    /// The signature bytes cannot be decoded.
    MalformedSignature,
    /// The signature does not belong to the claimed payer.
    SignerMismatch,
    /// The authorized amount differs from `maxAmountRequired`.
    AmountMismatch,
    /// The authorized asset differs from the required asset.
    AssetMismatch,
    /// The authorized recipient differs from `payTo`.
    RecipientMismatch,
    /// The authorization is bound to a different resource.
    ResourceMismatch,
    /// The authorization expired.
    Expired,
    /// The authorization's validity window has not started yet.
    NotYetValid,
}

impl InvalidReason {
    /// The wire string of this reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedVersion => "UnsupportedVersion",
            Self::InvalidRequirements => "InvalidRequirements",
            Self::InvalidPayload => "InvalidPayload",
            Self::SchemeMismatch => "SchemeMismatch",
            Self::NetworkMismatch => "NetworkMismatch",
            Self::SchemeNotFound => "SchemeNotFound",
            Self::MalformedSignature => "MalformedSignature",
            Self::SignerMismatch => "SignerMismatch",
            Self::AmountMismatch => "AmountMismatch",
            Self::AssetMismatch => "AssetMismatch",
            Self::RecipientMismatch => "RecipientMismatch",
            Self::ResourceMismatch => "ResourceMismatch",
            Self::Expired => "Expired",
            Self::NotYetValid => "NotYetValid",
        }
    }

    /// Whether the reason depends only on the clock.
    ///
    /// Such a payload may still name a settlement recorded while it was valid.
    #[must_use]
    pub const fn is_validity_window(&self) -> bool {
        matches!(self, Self::Expired | Self::NotYetValid)
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a settlement did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementErrorReason {
    /// Another settlement of the same authorization is still running.
    AlreadyInFlight,
    /// The authorization was already consumed on-chain.
    AlreadySettled,
    /// The chain refused or reverted the transfer.
    ChainRejected,
    /// No outcome within the settlement deadline. The transfer may still land.
    Timeout,
    /// The payer's balance does not cover the transfer.
    InsufficientFunds,
    /// The payment did not pass verification, so nothing was submitted.
    InvalidPayment,
}

impl SettlementErrorReason {
    /// The wire string of this reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyInFlight => "AlreadyInFlight",
            Self::AlreadySettled => "AlreadySettled",
            Self::ChainRejected => "ChainRejected",
            Self::Timeout => "Timeout",
            Self::InsufficientFunds => "InsufficientFunds",
            Self::InvalidPayment => "InvalidPayment",
        }
    }

    /// Whether resending the same payload later can still succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::AlreadyInFlight | Self::Timeout)
    }
}

impl fmt::Display for SettlementErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
