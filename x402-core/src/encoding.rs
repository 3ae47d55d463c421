//! Base64 helpers shared by the header codec and chain payloads.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt::Display;

/// Raw bytes carried as a standard, padded base64 string.
///
/// Account- and object-model payloads embed their serialized messages this way.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Base64Bytes(pub Vec<u8>);

impl Base64Bytes {
    /// Decodes base64 text into raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64.
    pub fn decode<T: AsRef<[u8]>>(input: T) -> Result<Self, base64::DecodeError> {
        b64.decode(input.as_ref()).map(Self)
    }

    /// Encodes the bytes as base64 text.
    #[must_use]
    pub fn encode(&self) -> String {
        b64.encode(&self.0)
    }

    /// Consumes the wrapper and returns the raw bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for Base64Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Base64Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Display for Base64Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl Serialize for Base64Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Base64Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::decode(s.trim()).map_err(de::Error::custom)
    }
}
