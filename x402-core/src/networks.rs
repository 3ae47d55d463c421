//! Human-readable network names.
//!
//! Deployments often name networks (`"base-sepolia"`, `"solana-devnet"`)
//! rather than spelling out CAIP-2 identifiers. Chain crates publish their
//! known networks as `&[NetworkInfo]` slices and applications assemble a
//! [`NetworkRegistry`] from them at startup.

use std::collections::HashMap;

use crate::chain::ChainId;

/// A named network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Name used in configuration (`"base-sepolia"`).
    pub name: &'static str,
    /// CAIP-2 namespace.
    pub namespace: &'static str,
    /// CAIP-2 reference.
    pub reference: &'static str,
}

impl NetworkInfo {
    /// The network's [`ChainId`].
    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        ChainId::new(self.namespace, self.reference)
    }
}

/// Names and chain ids of the networks a deployment knows about.
///
/// ```
/// use x402_core::networks::{NetworkInfo, NetworkRegistry};
///
/// const DEVNET: NetworkInfo = NetworkInfo {
///     name: "solana-devnet",
///     namespace: "solana",
///     reference: "EtWTRABZaYq6iMfeYKouRu166VU2xqa1",
/// };
/// let networks = NetworkRegistry::from_networks(&[DEVNET]);
/// assert_eq!(networks.resolve("solana-devnet"), Some(DEVNET.chain_id()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    by_name: HashMap<&'static str, ChainId>,
    by_chain: HashMap<ChainId, &'static str>,
}

impl NetworkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `networks`.
    #[must_use]
    pub fn from_networks(networks: &[NetworkInfo]) -> Self {
        Self::new().with(networks)
    }

    /// Adds `networks`; a repeated name is remapped.
    pub fn extend(&mut self, networks: &[NetworkInfo]) {
        for info in networks {
            let chain_id = info.chain_id();
            self.by_chain.insert(chain_id.clone(), info.name);
            self.by_name.insert(info.name, chain_id);
        }
    }

    /// Adds `networks` and returns `self`.
    #[must_use]
    pub fn with(mut self, networks: &[NetworkInfo]) -> Self {
        self.extend(networks);
        self
    }

    /// Chain id registered under `name`.
    #[must_use]
    pub fn chain_id(&self, name: &str) -> Option<&ChainId> {
        self.by_name.get(name)
    }

    /// Name registered for `chain_id`.
    #[must_use]
    pub fn name(&self, chain_id: &ChainId) -> Option<&'static str> {
        self.by_chain.get(chain_id).copied()
    }

    /// Resolves a registered name, else parses `network` as a chain id.
    ///
    /// Names win, so `"solana-devnet"` maps to the cluster's genesis
    /// reference rather than the literal `solana:devnet`.
    #[must_use]
    pub fn resolve(&self, network: &str) -> Option<ChainId> {
        self.chain_id(network)
            .cloned()
            .or_else(|| network.parse().ok())
    }

    /// Number of names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether no names are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
