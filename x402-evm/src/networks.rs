//! Known EVM networks and USDC token deployments.

use alloy_primitives::{Address, address};
use serde_json::json;
use x402_core::amount::{MoneyAmount, MoneyAmountError, TokenAmount};
use x402_core::chain::ChainId;
use x402_core::networks::NetworkInfo;
use x402_core::proto::{PaymentRequirements, RequirementsBuilder};
use x402_core::scheme::EXACT_SCHEME;

use crate::NAMESPACE;

const fn evm(name: &'static str, reference: &'static str) -> NetworkInfo {
    NetworkInfo {
        name,
        namespace: NAMESPACE,
        reference,
    }
}

/// Base Mainnet.
pub const BASE: NetworkInfo = evm("base", "8453");
/// Base Sepolia (testnet).
pub const BASE_SEPOLIA: NetworkInfo = evm("base-sepolia", "84532");
/// Ethereum Mainnet.
pub const ETHEREUM: NetworkInfo = evm("ethereum", "1");
/// Polygon Mainnet.
pub const POLYGON: NetworkInfo = evm("polygon", "137");
/// Polygon Amoy (testnet).
pub const POLYGON_AMOY: NetworkInfo = evm("polygon-amoy", "80002");
/// Avalanche C-Chain.
pub const AVALANCHE: NetworkInfo = evm("avalanche", "43114");
/// Avalanche Fuji (testnet).
pub const AVALANCHE_FUJI: NetworkInfo = evm("avalanche-fuji", "43113");
/// Celo Mainnet.
pub const CELO: NetworkInfo = evm("celo", "42220");

/// All EVM networks known to this crate.
pub static KNOWN_NETWORKS: &[NetworkInfo] = &[
    BASE,
    BASE_SEPOLIA,
    ETHEREUM,
    POLYGON,
    POLYGON_AMOY,
    AVALANCHE,
    AVALANCHE_FUJI,
    CELO,
];

/// Default EIP-712 domain version of USDC.
pub const USDC_VERSION: &str = "2";

/// Decimals of USDC on every EVM deployment.
pub const USDC_DECIMALS: u32 = 6;

/// An ERC-3009 token deployment and the EIP-712 domain it signs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenDeployment {
    /// Network the token lives on.
    pub network: NetworkInfo,
    /// Token contract, also the EIP-712 verifying contract.
    pub address: Address,
    /// EIP-712 domain name.
    pub name: &'static str,
    /// EIP-712 domain version.
    pub version: &'static str,
    /// Token decimals.
    pub decimals: u32,
}

const fn usdc(network: NetworkInfo, address: Address, name: &'static str) -> TokenDeployment {
    TokenDeployment {
        network,
        address,
        name,
        version: USDC_VERSION,
        decimals: USDC_DECIMALS,
    }
}

/// USDC deployments on the known networks.
pub static USDC_DEPLOYMENTS: &[TokenDeployment] = &[
    usdc(BASE, address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"), "USD Coin"),
    usdc(BASE_SEPOLIA, address!("036CbD53842c5426634e7929541eC2318f3dCF7e"), "USDC"),
    usdc(ETHEREUM, address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), "USD Coin"),
    usdc(POLYGON, address!("3c499c542cEF5E3811e1192ce70d8cC03d5c3359"), "USD Coin"),
    usdc(POLYGON_AMOY, address!("41E94Eb71Ef8C9fAE0235d1e472b21E21B5a4dbF"), "USDC"),
    usdc(AVALANCHE, address!("B97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"), "USD Coin"),
    usdc(AVALANCHE_FUJI, address!("5425890298aed601595a70AB815c96711a31Bc65"), "USD Coin"),
    usdc(CELO, address!("cebA9300f2b948710d2653dD7B07f33A8B32118C"), "USDC"),
];

/// The USDC deployment on `chain`, if known.
#[must_use]
pub fn usdc_deployment(chain: &ChainId) -> Option<&'static TokenDeployment> {
    USDC_DEPLOYMENTS
        .iter()
        .find(|deployment| deployment.network.chain_id() == *chain)
}

impl TokenDeployment {
    /// The `extra` object clients need to rebuild the signing domain.
    #[must_use]
    pub fn extra(&self) -> serde_json::Value {
        json!({ "name": self.name, "version": self.version })
    }

    /// Converts a human price such as `"$0.01"` into token units.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyAmountError`] if the price is malformed or too precise.
    pub fn price(&self, price: &str) -> Result<TokenAmount, MoneyAmountError> {
        MoneyAmount::parse(price)?.to_token_amount(self.decimals)
    }

    /// Starts "exact" requirements paying in this token.
    ///
    /// Asset, network and `extra` are filled in; the caller adds amount,
    /// recipient and resource.
    #[must_use]
    pub fn requirements(&self) -> RequirementsBuilder {
        PaymentRequirements::builder(EXACT_SCHEME, self.network.chain_id())
            .asset(self.address.to_string())
            .extra(self.extra())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_deployment_is_on_a_known_network() {
        for deployment in USDC_DEPLOYMENTS {
            assert!(KNOWN_NETWORKS.contains(&deployment.network));
        }
    }

    #[test]
    fn test_lookup_by_chain_id() {
        let chain: ChainId = "eip155:84532".parse().unwrap();
        let deployment = usdc_deployment(&chain).unwrap();
        assert_eq!(deployment.name, "USDC");
        assert!(usdc_deployment(&ChainId::new("eip155", "999999")).is_none());
    }

    #[test]
    fn test_requirements_from_deployment() {
        let deployment = usdc_deployment(&BASE_SEPOLIA.chain_id()).unwrap();
        let requirements = deployment
            .requirements()
            .amount(deployment.price("$0.01").unwrap())
            .pay_to("0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B")
            .resource("/weather")
            .build()
            .unwrap();
        assert_eq!(requirements.max_amount_required, TokenAmount::from(10_000));
        assert_eq!(requirements.extra, Some(json!({"name": "USDC", "version": "2"})));
        assert!(deployment.price("0.0000001").is_err());
    }
}
