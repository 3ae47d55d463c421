//! EOA signature parsing and recovery.
//!
//! Verification never touches the chain, so contract-wallet signatures
//! (EIP-1271, EIP-6492) are out of reach and only raw ECDSA forms parse.

use alloy_primitives::{Address, B256, Signature};

/// Parses a 65-byte `r‖s‖v` or 64-byte ERC-2098 signature.
///
/// High-`s` signatures are refused: token contracts reject them on
/// submission, and the payload is submitted as signed.
pub(super) fn parse(bytes: &[u8]) -> Option<Signature> {
    let signature = match bytes.len() {
        65 => Signature::from_raw(bytes).ok()?,
        64 => Signature::from_erc2098(bytes),
        _ => return None,
    };
    signature.normalize_s().is_none().then_some(signature)
}

/// Recovers the signer of `prehash`.
pub(super) fn recover(signature: &Signature, prehash: &B256) -> Option<Address> {
    signature.recover_address_from_prehash(prehash).ok()
}
