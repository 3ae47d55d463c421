//! Registry of scheme implementations keyed by (scheme, network).

use std::collections::HashMap;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use super::SchemeFacilitator;
use crate::chain::ChainId;
use crate::proto::{SupportedKind, SupportedResponse, X402Version};

/// Registry key: a scheme name on a network, or on a `namespace:*` pattern.
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct SchemeKey {
    /// Scheme name (e.g., "exact").
    pub scheme: String,
    /// Network or namespace pattern.
    pub network: ChainId,
}

impl SchemeKey {
    /// Creates a new key.
    pub fn new<S: Into<String>>(scheme: S, network: ChainId) -> Self {
        Self {
            scheme: scheme.into(),
            network,
        }
    }

    /// The namespace-wide key covering this one.
    #[must_use]
    pub fn as_wildcard(&self) -> Self {
        Self {
            scheme: self.scheme.clone(),
            network: self.network.as_wildcard(),
        }
    }
}

impl Display for SchemeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network, self.scheme)
    }
}

/// No scheme is registered for the requested pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no scheme {scheme:?} registered for network {network}")]
pub struct SchemeNotFound {
    /// Requested scheme.
    pub scheme: String,
    /// Requested network.
    pub network: ChainId,
}

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The pair already has an implementation; use [`SchemeRegistry::replace`].
    #[error("{0} is already registered")]
    AlreadyRegistered(SchemeKey),
}

/// Maps (scheme, network) to a shared [`SchemeFacilitator`].
///
/// Registration needs `&mut self` and is the only way to change the
/// registry. Once built, wrap it in an [`Arc`]: lookups take `&self` and are
/// safe for any number of concurrent readers.
///
/// Lookup tries the exact network first, then a namespace-wide registration.
#[derive(Default)]
pub struct SchemeRegistry(HashMap<SchemeKey, Arc<dyn SchemeFacilitator>>);

impl Debug for SchemeRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.0.keys().map(ToString::to_string).collect();
        keys.sort_unstable();
        f.debug_tuple("SchemeRegistry").field(&keys).finish()
    }
}

impl SchemeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Registers `facilitator` for `scheme` on `network`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] if the pair is taken.
    pub fn register<S: Into<String>>(
        &mut self,
        scheme: S,
        network: ChainId,
        facilitator: Arc<dyn SchemeFacilitator>,
    ) -> Result<&mut Self, RegistryError> {
        let key = SchemeKey::new(scheme, network);
        if self.0.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered(key));
        }
        self.0.insert(key, facilitator);
        Ok(self)
    }

    /// Registers `facilitator` for every network in `namespace` without an exact registration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] if the namespace is taken.
    pub fn register_for_namespace<S: Into<String>, N: Into<String>>(
        &mut self,
        scheme: S,
        namespace: N,
        facilitator: Arc<dyn SchemeFacilitator>,
    ) -> Result<&mut Self, RegistryError> {
        self.register(scheme, ChainId::wildcard(namespace), facilitator)
    }

    /// Installs `facilitator` for the pair, returning the implementation it displaced.
    pub fn replace<S: Into<String>>(
        &mut self,
        scheme: S,
        network: ChainId,
        facilitator: Arc<dyn SchemeFacilitator>,
    ) -> Option<Arc<dyn SchemeFacilitator>> {
        self.0.insert(SchemeKey::new(scheme, network), facilitator)
    }

    /// Finds the implementation for `scheme` on `network`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeNotFound`] if neither the network nor its namespace is registered.
    pub fn lookup(
        &self,
        scheme: &str,
        network: &ChainId,
    ) -> Result<&Arc<dyn SchemeFacilitator>, SchemeNotFound> {
        let key = SchemeKey::new(scheme, network.clone());
        self.0
            .get(&key)
            .or_else(|| self.0.get(&key.as_wildcard()))
            .ok_or_else(|| SchemeNotFound {
                scheme: scheme.to_owned(),
                network: network.clone(),
            })
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Registered combinations, sorted for stable output.
    #[must_use]
    pub fn supported(&self) -> SupportedResponse {
        let mut entries: Vec<_> = self.0.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        let kinds = entries
            .into_iter()
            .map(|(key, facilitator)| SupportedKind {
                x402_version: X402Version::CURRENT,
                scheme: key.scheme.clone(),
                network: key.network.clone(),
                extra: facilitator.supported_extra(&key.network),
            })
            .collect();
        SupportedResponse { kinds }
    }
}
