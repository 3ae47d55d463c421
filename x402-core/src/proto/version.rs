//! Protocol version negotiation.
//!
//! Every payload and every requirements advertisement carries `x402Version`.
//! A server advertising version N accepts payloads at versions up to N that it
//! knows how to decode. Anything else is rejected, never downgraded.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An `x402Version` value as it appears on the wire.
///
/// Deserialization accepts any integer so that unknown versions reach
/// [`X402Version::negotiate`] and fail with a distinct error instead of a
/// generic parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct X402Version(pub u64);

/// Versions this engine knows how to decode, oldest first.
pub const SUPPORTED_VERSIONS: &[X402Version] = &[X402Version::V1];

impl X402Version {
    /// Protocol version 1.
    pub const V1: Self = Self(1);

    /// The newest version this engine speaks.
    pub const CURRENT: Self = Self::V1;

    /// Whether this engine can decode payloads of this version.
    #[must_use]
    pub fn is_supported(self) -> bool {
        SUPPORTED_VERSIONS.contains(&self)
    }

    /// Accepts `offered` against a server advertising `self`.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedVersion`] if `offered` is newer than the advertised
    /// version or is not one this engine can decode.
    pub fn negotiate(self, offered: Self) -> Result<Self, UnsupportedVersion> {
        if offered <= self && offered.is_supported() {
            Ok(offered)
        } else {
            Err(UnsupportedVersion {
                offered,
                advertised: self,
            })
        }
    }
}

impl Default for X402Version {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for X402Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A payload or request declared a version this side cannot accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("x402Version {offered} is not supported (advertised {advertised})")]
pub struct UnsupportedVersion {
    /// The version the peer declared.
    pub offered: X402Version,
    /// The version this side advertises.
    pub advertised: X402Version,
}
