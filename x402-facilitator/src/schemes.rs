//! Builds the facilitator's registries from configuration.
//!
//! Every configured chain gets the "exact" scheme of its family. A chain
//! whose family was compiled out (see the `chain-*` features) is skipped
//! with a warning, as is a chain whose secrets did not resolve.
//!
//! | Family | Scheme | Settles with |
//! |--------|--------|--------------|
//! | `eip155` | `ExactEvmScheme` | `EvmChainClient` when `rpc_url` and `signer_private_key` are set |
//! | `solana` | `ExactSvmScheme` | none built in |
//! | `sui` | `ExactSuiScheme` | none built in |

use std::sync::Arc;

use x402_core::chain::{ChainFamily, ChainId};
use x402_core::facilitator::LocalFacilitator;
use x402_core::networks::NetworkRegistry;
#[allow(unused_imports)] // For when no chain features are enabled
use x402_core::scheme::EXACT_SCHEME;
use x402_core::scheme::{RegistryError, SchemeRegistry};
use x402_core::settle::{ChainRegistry, SettlementEngine};
use x402_core::verify::VerificationEngine;

#[allow(unused_imports)] // For when no chain features are enabled
use crate::config::is_unresolved;
use crate::config::{ChainConfig, FacilitatorConfig};

/// The configuration names something that cannot be built.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// A `[chains]` key is neither a known network name nor a CAIP-2 identifier.
    #[error("unknown network {0:?}")]
    UnknownNetwork(String),
    /// `rpc_url` is not a URL.
    #[error("invalid rpc_url for {network}: {source}")]
    InvalidRpcUrl {
        /// Chain being configured.
        network: ChainId,
        /// Parse error.
        #[source]
        source: url::ParseError,
    },
    /// `signer_private_key` is not a private key.
    #[error("invalid signer_private_key for {network}: {message}")]
    InvalidSignerKey {
        /// Chain being configured.
        network: ChainId,
        /// Why the key was refused.
        message: String,
    },
    /// `fee_payer` is not an account address.
    #[error("invalid fee_payer for {network}: {message}")]
    InvalidFeePayer {
        /// Chain being configured.
        network: ChainId,
        /// Why the address was refused.
        message: String,
    },
    /// Two keys resolve to the same chain.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Scheme and chain registries assembled from a configuration.
#[derive(Debug, Default)]
pub struct Registries {
    /// Verification side.
    pub schemes: SchemeRegistry,
    /// Settlement side.
    pub chains: ChainRegistry,
}

impl Registries {
    /// Builds both registries from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] for malformed networks, URLs or keys.
    pub fn from_config(config: &FacilitatorConfig) -> Result<Self, SetupError> {
        let mut registries = Self::default();
        let names = known_networks();

        let mut networks: Vec<_> = config.chains.iter().collect();
        networks.sort_by(|a, b| a.0.cmp(b.0));

        for (network, chain) in networks {
            let chain_id = names
                .resolve(network)
                .ok_or_else(|| SetupError::UnknownNetwork(network.clone()))?;
            registries.add_chain(chain_id, chain)?;
        }
        Ok(registries)
    }

    #[allow(unused_variables)] // For when no chain features are enabled
    fn add_chain(&mut self, chain_id: ChainId, chain: &ChainConfig) -> Result<(), SetupError> {
        match chain_id.family() {
            #[cfg(feature = "chain-eip155")]
            ChainFamily::Evm => self.add_evm(chain_id, chain),
            #[cfg(feature = "chain-solana")]
            ChainFamily::AccountModel => self.add_account_model(chain_id, chain),
            #[cfg(feature = "chain-sui")]
            ChainFamily::ObjectModel => self.add_object_model(chain_id),
            family => {
                tracing::warn!(network = %chain_id, ?family, "Skipping chain: no scheme for this family");
                Ok(())
            }
        }
    }

    #[cfg(feature = "chain-eip155")]
    fn add_evm(&mut self, chain_id: ChainId, chain: &ChainConfig) -> Result<(), SetupError> {
        use alloy_signer_local::PrivateKeySigner;
        use x402_evm::{EvmChainClient, ExactEvmScheme};

        self.schemes
            .register(EXACT_SCHEME, chain_id.clone(), Arc::new(ExactEvmScheme))?;

        let (Some(rpc_url), Some(key)) = (&chain.rpc_url, &chain.signer_private_key) else {
            tracing::info!(network = %chain_id, "Registered EVM exact scheme (verify only)");
            return Ok(());
        };
        if is_unresolved(key) || is_unresolved(rpc_url) {
            tracing::warn!(
                network = %chain_id,
                "Settlement disabled: rpc_url or signer_private_key not resolved (missing env var?)"
            );
            return Ok(());
        }

        let signer: PrivateKeySigner =
            key.trim().parse().map_err(|e: alloy_signer_local::LocalSignerError| {
                SetupError::InvalidSignerKey {
                    network: chain_id.clone(),
                    message: e.to_string(),
                }
            })?;
        let signer_address = signer.address();
        let rpc_url = rpc_url.parse::<url::Url>().map_err(|source| SetupError::InvalidRpcUrl {
            network: chain_id.clone(),
            source,
        })?;

        let mut client = EvmChainClient::connect(rpc_url, signer);
        if let Some(blocks) = chain.lookback_blocks {
            client = client.with_lookback_blocks(blocks);
        }
        self.chains.insert(chain_id.clone(), Arc::new(client));
        tracing::info!(network = %chain_id, signer = %signer_address, "Registered EVM exact scheme");
        Ok(())
    }

    #[cfg(feature = "chain-solana")]
    fn add_account_model(&mut self, chain_id: ChainId, chain: &ChainConfig) -> Result<(), SetupError> {
        use x402_svm::ExactSvmScheme;
        use x402_svm::exact::AccountKey;

        let mut scheme = ExactSvmScheme::new();
        match chain.fee_payer.as_deref() {
            Some(fee_payer) if is_unresolved(fee_payer) => {
                tracing::warn!(network = %chain_id, "fee_payer not resolved (missing env var?); not advertised");
            }
            Some(fee_payer) => {
                let key: AccountKey =
                    fee_payer
                        .trim()
                        .parse()
                        .map_err(|e: x402_svm::exact::AccountKeyError| SetupError::InvalidFeePayer {
                            network: chain_id.clone(),
                            message: e.to_string(),
                        })?;
                scheme = scheme.with_fee_payer(key);
            }
            None => {}
        }

        self.schemes
            .register(EXACT_SCHEME, chain_id.clone(), Arc::new(scheme))?;
        tracing::info!(network = %chain_id, "Registered account-model exact scheme");
        Ok(())
    }

    #[cfg(feature = "chain-sui")]
    fn add_object_model(&mut self, chain_id: ChainId) -> Result<(), SetupError> {
        self.schemes
            .register(EXACT_SCHEME, chain_id.clone(), Arc::new(x402_sui::ExactSuiScheme))?;
        tracing::info!(network = %chain_id, "Registered object-model exact scheme");
        Ok(())
    }

    /// Assembles the in-process facilitator.
    #[must_use]
    pub fn into_facilitator(self, config: &FacilitatorConfig) -> LocalFacilitator {
        let verifier = VerificationEngine::new(Arc::new(self.schemes));
        let settler = SettlementEngine::in_memory(self.chains).with_config(config.settlement_config());
        LocalFacilitator::new(verifier, settler)
    }
}

/// Names of every network the enabled chain families know about.
#[must_use]
pub fn known_networks() -> NetworkRegistry {
    #[allow(unused_mut)] // For when no chain features are enabled
    let mut names = NetworkRegistry::new();
    #[cfg(feature = "chain-eip155")]
    names.extend(x402_evm::networks::KNOWN_NETWORKS);
    #[cfg(feature = "chain-solana")]
    names.extend(x402_svm::networks::KNOWN_NETWORKS);
    #[cfg(feature = "chain-sui")]
    names.extend(x402_sui::networks::KNOWN_NETWORKS);
    names
}

/// Builds a [`LocalFacilitator`] for `config`.
///
/// # Errors
///
/// Returns [`SetupError`] for malformed networks, URLs or keys.
pub fn build_facilitator(config: &FacilitatorConfig) -> Result<LocalFacilitator, SetupError> {
    let registries = Registries::from_config(config)?;
    if registries.chains.is_empty() {
        tracing::warn!("No settlement chains configured; /settle will report NoChainClient");
    }
    Ok(registries.into_facilitator(config))
}
