//! Wire types and signing domain for the EVM "exact" scheme.

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_sol_types::{Eip712Domain, eip712_domain, sol};
use serde::{Deserialize, Serialize};
use x402_core::amount::TokenAmount;
use x402_core::proto::PaymentRequirements;
use x402_core::timestamp::UnixTimestamp;

sol! {
    /// EIP-3009 `TransferWithAuthorization` as signed under EIP-712.
    ///
    /// Field names and order are part of the type hash and must not change.
    #[allow(missing_docs)]
    #[derive(Debug, PartialEq, Eq)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

/// The `payload` of an EVM "exact" [`PaymentPayload`](x402_core::proto::PaymentPayload).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    /// EIP-712 signature, 65-byte `r‖s‖v` or 64-byte ERC-2098 compact form.
    pub signature: Bytes,
    /// The signed authorization fields.
    pub authorization: ExactEvmAuthorization,
    /// Salt the nonce was derived from together with the resource.
    pub salt: B256,
}

/// Authorization fields, mirroring [`TransferWithAuthorization`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmAuthorization {
    /// Payer.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Amount in token units.
    pub value: TokenAmount,
    /// Not valid before this time.
    pub valid_after: UnixTimestamp,
    /// Expired from this time on.
    pub valid_before: UnixTimestamp,
    /// `keccak256(keccak256(resource) ‖ salt)`.
    pub nonce: B256,
}

impl From<&ExactEvmAuthorization> for TransferWithAuthorization {
    fn from(authorization: &ExactEvmAuthorization) -> Self {
        Self {
            from: authorization.from,
            to: authorization.to,
            value: authorization.value.into(),
            validAfter: U256::from(authorization.valid_after.as_secs()),
            validBefore: U256::from(authorization.valid_before.as_secs()),
            nonce: authorization.nonce,
        }
    }
}

/// EIP-712 domain parameters carried in the requirements' `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainExtra {
    /// Token name as reported by the contract's `name()`.
    pub name: String,
    /// Token domain version, e.g. `"2"` for USDC.
    pub version: String,
}

/// Why the signing domain cannot be derived from requirements.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// `extra` lacks `name`/`version`.
    #[error("extra must carry the token's EIP-712 name and version")]
    MissingExtra,
    /// The network reference is not a numeric chain id.
    #[error("network reference {0:?} is not an EIP-155 chain id")]
    ChainId(String),
    /// The asset is not a contract address.
    #[error("asset {0:?} is not an address")]
    Asset(String),
    /// `payTo` is not an address.
    #[error("payTo {0:?} is not an address")]
    PayTo(String),
}

/// The typed EVM view of a requirements entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmTerms {
    /// Domain the authorization is signed under.
    pub domain: Eip712Domain,
    /// Token contract.
    pub asset: Address,
    /// Recipient.
    pub pay_to: Address,
}

impl EvmTerms {
    /// Derives the signing domain and addresses from `requirements`.
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] for the first field that does not parse.
    pub fn from_requirements(requirements: &PaymentRequirements) -> Result<Self, DomainError> {
        let extra: DomainExtra = requirements
            .extra_as()
            .ok()
            .flatten()
            .ok_or(DomainError::MissingExtra)?;
        let chain_id: u64 = requirements
            .network
            .reference()
            .parse()
            .map_err(|_| DomainError::ChainId(requirements.network.reference().to_owned()))?;
        let asset: Address = requirements
            .asset
            .parse()
            .map_err(|_| DomainError::Asset(requirements.asset.clone()))?;
        let pay_to: Address = requirements
            .pay_to
            .parse()
            .map_err(|_| DomainError::PayTo(requirements.pay_to.clone()))?;
        let domain = eip712_domain! {
            name: extra.name,
            version: extra.version,
            chain_id: chain_id,
            verifying_contract: asset,
        };
        Ok(Self {
            domain,
            asset,
            pay_to,
        })
    }
}

/// Nonce binding an authorization to `resource`.
#[must_use]
pub fn resource_nonce(resource: &str, salt: &B256) -> B256 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(keccak256(resource.as_bytes()).as_slice());
    preimage[32..].copy_from_slice(salt.as_slice());
    keccak256(preimage)
}
