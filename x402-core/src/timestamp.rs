//! Unix timestamps for authorization validity windows.
//!
//! Every "exact" authorization carries an expiry derived from the
//! requirements' `maxTimeoutSeconds`. Verification compares it against a
//! [`UnixTimestamp`] supplied by the caller, so the verdict stays a pure
//! function of its inputs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::ops::{Add, Sub};
use std::time::SystemTime;

/// Seconds since the Unix epoch.
///
/// On the wire this is a decimal string such as `"1699999999"`, which
/// survives JSON parsers that read numbers as doubles.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct UnixTimestamp(u64);

impl From<UnixTimestamp> for String {
    fn from(ts: UnixTimestamp) -> Self {
        ts.0.to_string()
    }
}

impl TryFrom<String> for UnixTimestamp {
    type Error = ParseIntError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse().map(Self)
    }
}

impl fmt::Display for UnixTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.saturating_add(rhs))
    }
}

impl Sub<u64> for UnixTimestamp {
    type Output = Self;

    fn sub(self, rhs: u64) -> Self::Output {
        Self(self.0.saturating_sub(rhs))
    }
}

impl UnixTimestamp {
    /// Wraps a count of seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// The system clock, read as zero if it is set before the epoch.
    #[must_use]
    pub fn now() -> Self {
        SystemTime::UNIX_EPOCH
            .elapsed()
            .map_or(Self(0), |elapsed| Self(elapsed.as_secs()))
    }

    /// Seconds since the epoch.
    #[must_use]
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Whether an authorization expiring at `self` is expired at `now`.
    ///
    /// Expiry is inclusive: an authorization is already expired in the second it names.
    #[must_use]
    pub fn is_expired_at(&self, now: Self) -> bool {
        self.0 <= now.0
    }
}
