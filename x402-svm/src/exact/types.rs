//! Wire types for the account-model "exact" scheme.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use solana_pubkey::{Pubkey, pubkey};
use x402_core::encoding::Base64Bytes;

/// SPL Token program.
pub const TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

/// SPL Token-2022 program.
pub const TOKEN_2022_PROGRAM_ID: Pubkey = pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// Prefix of every signed transfer message.
///
/// The leading `0xff` is not a valid message version, so signed bytes never
/// parse as a transaction message.
pub const SIGNING_DOMAIN: &[u8] = b"\xffx402-exact-svm-transfer:v1\n";

/// A 32-byte account address.
///
/// Base58 in human-readable formats (JSON), raw bytes in the signed bincode message.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountKey(pub [u8; 32]);

impl AccountKey {
    /// The key's raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<Pubkey> for AccountKey {
    fn from(pubkey: Pubkey) -> Self {
        Self(pubkey.to_bytes())
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountKey({self})")
    }
}

/// A string that is not a base58 32-byte key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0:?} is not a base58 account address")]
pub struct AccountKeyError(pub String);

impl FromStr for AccountKey {
    type Err = AccountKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        bs58::decode(s)
            .into_vec()
            .ok()
            .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
            .map(Self)
            .ok_or_else(|| AccountKeyError(s.to_owned()))
    }
}

impl Serialize for AccountKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for AccountKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self)
        }
    }
}

/// What the payer signs: a token transfer bound to one resource and deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMessage {
    /// Network reference this message is valid on.
    pub cluster: String,
    /// Token program executing the transfer.
    pub program_id: AccountKey,
    /// Token mint.
    pub mint: AccountKey,
    /// Owner of the source token account.
    pub source_owner: AccountKey,
    /// Owner of the destination token account.
    pub destination_owner: AccountKey,
    /// Signer authorizing the transfer.
    pub authority: AccountKey,
    /// Account paying transaction fees.
    pub fee_payer: AccountKey,
    /// Amount in base units.
    pub amount: u64,
    /// Mint decimals, checked by `TransferChecked`.
    pub decimals: u8,
    /// Random per-payment value.
    pub nonce: [u8; 32],
    /// Protected resource.
    pub resource: String,
    /// Expired from this Unix time on.
    pub valid_until: u64,
}

impl TransferMessage {
    /// Bincode encoding of the message.
    ///
    /// # Errors
    ///
    /// Returns the bincode error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decodes a bincode-encoded message.
    ///
    /// # Errors
    ///
    /// Returns the bincode error if the bytes are not a message.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Bytes the ed25519 signature covers: [`SIGNING_DOMAIN`] followed by `message`.
#[must_use]
pub fn signing_bytes(message: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(SIGNING_DOMAIN.len() + message.len());
    bytes.extend_from_slice(SIGNING_DOMAIN);
    bytes.extend_from_slice(message);
    bytes
}

/// The `payload` of an account-model "exact" payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactSvmPayload {
    /// Bincode [`TransferMessage`], base64.
    pub message: Base64Bytes,
    /// Base58 ed25519 signature over [`signing_bytes`].
    pub signature: String,
}

/// Optional parameters in the requirements' `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SvmExtra {
    /// Mint decimals the transfer must declare.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    /// Fee payer the facilitator will sign as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_payer: Option<AccountKey>,
    /// Token program, when the mint belongs to Token-2022.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_program: Option<AccountKey>,
}

/// Whether `program` is one of the token programs a transfer may use.
#[must_use]
pub fn is_token_program(program: &AccountKey) -> bool {
    *program == AccountKey::from(TOKEN_PROGRAM_ID) || *program == AccountKey::from(TOKEN_2022_PROGRAM_ID)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_account_key_is_base58_in_json_and_raw_in_bincode() {
        let key = AccountKey::from(TOKEN_PROGRAM_ID);
        assert_eq!(
            serde_json::to_value(key).unwrap(),
            json!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA")
        );
        assert_eq!(bincode::serialize(&key).unwrap().len(), 32);
        assert!("not-a-key".parse::<AccountKey>().is_err());
    }

    #[test]
    fn test_extra_parses_fee_payer() {
        let extra: SvmExtra = serde_json::from_value(json!({
            "decimals": 6,
            "feePayer": "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb",
        }))
        .unwrap();
        assert_eq!(extra.decimals, Some(6));
        assert_eq!(extra.fee_payer, Some(AccountKey::from(TOKEN_2022_PROGRAM_ID)));
        assert!(is_token_program(&extra.fee_payer.unwrap()));
    }
}
