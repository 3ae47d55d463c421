//! Wire types and hashing rules for the object-model "exact" scheme.

use std::fmt;
use std::str::FromStr;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use ed25519_dalek::{SIGNATURE_LENGTH, Signature, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use x402_core::encoding::Base64Bytes;

type Blake2b256 = Blake2b<U32>;

/// Intent prefix of a transaction-data message: scope, version, app id.
pub const TRANSACTION_INTENT: [u8; 3] = [0, 0, 0];

/// Signature scheme flag for ed25519.
pub const ED25519_FLAG: u8 = 0x00;

/// Length of a serialized ed25519 signature: flag, signature, public key.
pub const SERIALIZED_SIGNATURE_LENGTH: usize = 1 + SIGNATURE_LENGTH + 32;

/// A 32-byte account or object address.
///
/// `0x`-prefixed hex in JSON, raw bytes in BCS. Short forms such as `0x2`
/// are left-padded with zeros.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SuiAddress(pub [u8; 32]);

impl SuiAddress {
    /// The address's raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Address controlled by an ed25519 key.
    #[must_use]
    pub fn from_public_key(key: &VerifyingKey) -> Self {
        let mut hasher = Blake2b256::new();
        hasher.update([ED25519_FLAG]);
        hasher.update(key.as_bytes());
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for SuiAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for SuiAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SuiAddress({self})")
    }
}

/// A string that is not a `0x`-prefixed address of at most 64 hex digits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0:?} is not an object-model address")]
pub struct SuiAddressError(pub String);

impl FromStr for SuiAddress {
    type Err = SuiAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SuiAddressError(s.to_owned());
        let digits = s.strip_prefix("0x").ok_or_else(err)?;
        if digits.is_empty() || digits.len() > 64 {
            return Err(err());
        }
        let padded = format!("{digits:0>64}");
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(padded, &mut bytes).map_err(|_| err())?;
        Ok(Self(bytes))
    }
}

impl Serialize for SuiAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for SuiAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self)
        }
    }
}

/// Reference to a specific version of an owned object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Object id.
    pub object_id: SuiAddress,
    /// Sequence number the transfer consumes.
    pub version: u64,
    /// Content digest at that version.
    pub digest: [u8; 32],
}

/// What the payer signs: a transfer of `amount` out of one coin object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferData {
    /// Network reference (`mainnet`, `testnet`, ...).
    pub network: String,
    /// Owner of the coin.
    pub sender: SuiAddress,
    /// Receiver of the split-off amount.
    pub recipient: SuiAddress,
    /// Fully qualified coin type, e.g. `0x2::sui::SUI`.
    pub coin_type: String,
    /// Coin object the amount is split from.
    pub coin: ObjectRef,
    /// Amount in base units.
    pub amount: u64,
    /// Protected resource.
    pub resource: String,
    /// Random per-payment value.
    pub nonce: [u8; 32],
    /// Expired from this Unix time on.
    pub expiration: u64,
}

impl TransferData {
    /// BCS encoding of the transfer.
    ///
    /// # Errors
    ///
    /// Returns the BCS error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bcs::Error> {
        bcs::to_bytes(self)
    }

    /// Decodes BCS bytes.
    ///
    /// # Errors
    ///
    /// Returns the BCS error if the bytes are not a transfer or have trailing data.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bcs::Error> {
        bcs::from_bytes(bytes)
    }
}

/// Digest the payer signs: blake2b-256 of the intent prefix and the BCS bytes.
#[must_use]
pub fn signing_digest(transaction: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(TRANSACTION_INTENT);
    hasher.update(transaction);
    hasher.finalize().into()
}

/// An ed25519 signature with the key that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiSignature {
    /// Signature over [`signing_digest`].
    pub signature: Signature,
    /// Public key of the signer.
    pub public_key: VerifyingKey,
}

impl SuiSignature {
    /// Parses `flag || signature || public key`.
    ///
    /// Returns `None` for any other length, another flag, or an invalid key.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let bytes: &[u8; SERIALIZED_SIGNATURE_LENGTH] = bytes.try_into().ok()?;
        let (flag, rest) = bytes.split_first()?;
        if *flag != ED25519_FLAG {
            return None;
        }
        let (signature, key) = rest.split_at(SIGNATURE_LENGTH);
        let signature = Signature::from_slice(signature).ok()?;
        let public_key = VerifyingKey::from_bytes(key.try_into().ok()?).ok()?;
        Some(Self {
            signature,
            public_key,
        })
    }

    /// Serialized `flag || signature || public key`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SERIALIZED_SIGNATURE_LENGTH);
        bytes.push(ED25519_FLAG);
        bytes.extend_from_slice(&self.signature.to_bytes());
        bytes.extend_from_slice(self.public_key.as_bytes());
        bytes
    }
}

/// The `payload` of an object-model "exact" payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactSuiPayload {
    /// BCS [`TransferData`], base64.
    pub transaction: Base64Bytes,
    /// Serialized [`SuiSignature`], base64.
    pub signature: Base64Bytes,
}

/// Canonical form of a coin type, with the package address fully padded.
///
/// `0x2::sui::SUI` and `0x000...02::sui::SUI` name the same coin.
#[must_use]
pub fn normalize_coin_type(coin_type: &str) -> String {
    match coin_type.split_once("::") {
        Some((address, rest)) => match address.parse::<SuiAddress>() {
            Ok(address) => format!("{address}::{rest}"),
            Err(_) => coin_type.to_owned(),
        },
        None => coin_type.to_owned(),
    }
}
