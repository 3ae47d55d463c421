//! Well-known account-model networks and USDC mints.

use solana_pubkey::{Pubkey, pubkey};
use x402_core::chain::ChainId;
use x402_core::networks::NetworkInfo;

use crate::NAMESPACE;

/// Solana mainnet, referenced by its genesis hash prefix.
pub const SOLANA: NetworkInfo = NetworkInfo {
    name: "solana",
    namespace: NAMESPACE,
    reference: "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp",
};

/// Solana devnet.
pub const SOLANA_DEVNET: NetworkInfo = NetworkInfo {
    name: "solana-devnet",
    namespace: NAMESPACE,
    reference: "EtWTRABZaYq6iMfeYKouRu166VU2xqa1",
};

/// All account-model networks known to this crate.
pub static KNOWN_NETWORKS: &[NetworkInfo] = &[SOLANA, SOLANA_DEVNET];

/// A token mint on a known network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintDeployment {
    /// Network the mint lives on.
    pub network: NetworkInfo,
    /// Mint address.
    pub mint: Pubkey,
    /// Token decimals.
    pub decimals: u8,
}

/// Circle USDC mints (SPL Token program).
pub static USDC_MINTS: &[MintDeployment] = &[
    MintDeployment {
        network: SOLANA,
        mint: pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
        decimals: 6,
    },
    MintDeployment {
        network: SOLANA_DEVNET,
        mint: pubkey!("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"),
        decimals: 6,
    },
];

/// The known deployment of `mint` on `chain`, if any.
#[must_use]
pub fn mint_deployment(chain: &ChainId, mint: &str) -> Option<&'static MintDeployment> {
    USDC_MINTS
        .iter()
        .find(|d| d.network.chain_id() == *chain && d.mint.to_string() == mint)
}
