//! Chain identifiers and per-family address syntax.
//!
//! - [`ChainId`] - A CAIP-2 chain identifier (e.g., `eip155:84532` for Base Sepolia)
//! - [`ChainFamily`] - The signing model a namespace belongs to, with address syntax rules

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

/// CAIP-2 namespace of EVM chains.
pub const EIP155_NAMESPACE: &str = "eip155";
/// CAIP-2 namespace of Solana clusters.
pub const SOLANA_NAMESPACE: &str = "solana";
/// CAIP-2 namespace of Sui networks.
pub const SUI_NAMESPACE: &str = "sui";

/// Reference used by namespace-wide registrations.
const WILDCARD_REFERENCE: &str = "*";

/// A CAIP-2 compliant blockchain identifier.
///
/// The format is `namespace:reference` where:
///
/// - `namespace` identifies the blockchain family (e.g., `eip155`, `solana`, `sui`)
/// - `reference` identifies the specific chain within that family
///
/// Parsing also accepts the dashed shorthand `evm-84532`, `solana-devnet` or
/// `sui-testnet`. Serialization always produces the CAIP-2 form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId {
    namespace: String,
    reference: String,
}

impl ChainId {
    /// Creates a new chain ID from namespace and reference components.
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// Creates the namespace-wide pattern `namespace:*`.
    pub fn wildcard<N: Into<String>>(namespace: N) -> Self {
        Self::new(namespace, WILDCARD_REFERENCE)
    }

    /// Returns the namespace component of the chain ID.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the reference component of the chain ID.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Returns the namespace-wide pattern covering this chain.
    #[must_use]
    pub fn as_wildcard(&self) -> Self {
        Self::wildcard(self.namespace.clone())
    }

    /// Whether this identifier is a namespace-wide pattern.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.reference == WILDCARD_REFERENCE
    }

    /// Returns the signing family of this chain.
    #[must_use]
    pub fn family(&self) -> ChainFamily {
        ChainFamily::of(&self.namespace)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.to_string()
    }
}

/// Error returned when parsing an invalid chain ID string.
#[derive(Debug, thiserror::Error)]
#[error("Invalid chain id format {0}")]
pub struct ChainIdFormatError(String);

impl FromStr for ChainId {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((namespace, reference)) = s.split_once(':') {
            if namespace.is_empty() || reference.is_empty() {
                return Err(ChainIdFormatError(s.into()));
            }
            return Ok(Self::new(namespace, reference));
        }
        let (family, reference) = s
            .split_once('-')
            .ok_or_else(|| ChainIdFormatError(s.into()))?;
        let namespace = match family {
            "evm" | EIP155_NAMESPACE => EIP155_NAMESPACE,
            SOLANA_NAMESPACE => SOLANA_NAMESPACE,
            SUI_NAMESPACE => SUI_NAMESPACE,
            _ => return Err(ChainIdFormatError(s.into())),
        };
        if reference.is_empty() {
            return Err(ChainIdFormatError(s.into()));
        }
        Ok(Self::new(namespace, reference))
    }
}

impl Serialize for ChainId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// Signing model of a chain namespace.
///
/// Each family has its own address syntax; requirements naming a chain of a
/// known family are checked against these rules before anything else runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainFamily {
    /// EVM account-abstraction transfer authorization (`eip155`).
    Evm,
    /// Program-instruction model (`solana`).
    AccountModel,
    /// Object-transfer model (`sui`).
    ObjectModel,
    /// A namespace registered by a third-party scheme.
    Other,
}

impl ChainFamily {
    /// Classifies a CAIP-2 namespace.
    #[must_use]
    pub fn of(namespace: &str) -> Self {
        match namespace {
            EIP155_NAMESPACE => Self::Evm,
            SOLANA_NAMESPACE => Self::AccountModel,
            SUI_NAMESPACE => Self::ObjectModel,
            _ => Self::Other,
        }
    }

    /// Whether `address` is a syntactically valid account address.
    #[must_use]
    pub fn is_valid_address(self, address: &str) -> bool {
        match self {
            Self::Evm => is_prefixed_hex(address, 40, 40),
            Self::AccountModel => is_base58_key(address),
            Self::ObjectModel => is_prefixed_hex(address, 1, 64),
            Self::Other => !address.trim().is_empty(),
        }
    }

    /// Whether `asset` is a syntactically valid asset identifier.
    ///
    /// EVM and account-model assets are token contract / mint addresses. Object-model
    /// assets are coin types of the form `0x2::sui::SUI`.
    #[must_use]
    pub fn is_valid_asset(self, asset: &str) -> bool {
        match self {
            Self::Evm | Self::AccountModel | Self::Other => self.is_valid_address(asset),
            Self::ObjectModel => is_coin_type(asset),
        }
    }
}

fn is_prefixed_hex(value: &str, min_digits: usize, max_digits: usize) -> bool {
    let Some(digits) = value.strip_prefix("0x") else {
        return false;
    };
    (min_digits..=max_digits).contains(&digits.len())
        && digits.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_base58_key(value: &str) -> bool {
    bs58::decode(value)
        .into_vec()
        .is_ok_and(|bytes| bytes.len() == 32)
}

fn is_move_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_coin_type(value: &str) -> bool {
    let mut parts = value.split("::");
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(address), Some(module), Some(name), None) => {
            is_prefixed_hex(address, 1, 64) && is_move_identifier(module) && is_move_identifier(name)
        }
        _ => false,
    }
}
