//! Well-known object-model networks and coin types.

use x402_core::chain::ChainId;
use x402_core::networks::NetworkInfo;

use crate::NAMESPACE;
use crate::exact::normalize_coin_type;

/// Sui mainnet.
pub const SUI_MAINNET: NetworkInfo = NetworkInfo {
    name: "sui",
    namespace: NAMESPACE,
    reference: "mainnet",
};

/// Sui testnet.
pub const SUI_TESTNET: NetworkInfo = NetworkInfo {
    name: "sui-testnet",
    namespace: NAMESPACE,
    reference: "testnet",
};

/// All object-model networks known to this crate.
pub static KNOWN_NETWORKS: &[NetworkInfo] = &[SUI_MAINNET, SUI_TESTNET];

/// A coin type on a known network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinDeployment {
    /// Network the coin lives on.
    pub network: NetworkInfo,
    /// Fully qualified coin type.
    pub coin_type: &'static str,
    /// Coin decimals.
    pub decimals: u8,
}

/// The native coin, identical on every network.
pub const SUI_COIN_TYPE: &str = "0x2::sui::SUI";

/// Coins known to this crate.
pub static KNOWN_COINS: &[CoinDeployment] = &[
    CoinDeployment {
        network: SUI_MAINNET,
        coin_type: "0xdba34672e30cb065b1f93e3ab55318768fd6fef66c15942c9f7cb846e2f900e7::usdc::USDC",
        decimals: 6,
    },
    CoinDeployment {
        network: SUI_TESTNET,
        coin_type: "0xa1ec7fc00a6f40db9693ad1415d0c193ad3906494428cf252621037bd7117e29::usdc::USDC",
        decimals: 6,
    },
    CoinDeployment {
        network: SUI_MAINNET,
        coin_type: SUI_COIN_TYPE,
        decimals: 9,
    },
    CoinDeployment {
        network: SUI_TESTNET,
        coin_type: SUI_COIN_TYPE,
        decimals: 9,
    },
];

/// The known deployment of `coin_type` on `chain`, if any.
#[must_use]
pub fn coin_deployment(chain: &ChainId, coin_type: &str) -> Option<&'static CoinDeployment> {
    let wanted = normalize_coin_type(coin_type);
    KNOWN_COINS
        .iter()
        .find(|d| d.network.chain_id() == *chain && normalize_coin_type(d.coin_type) == wanted)
}
