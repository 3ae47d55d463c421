//! Narrow interface to a chain's RPC and submission service.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::chain::ChainId;
use crate::proto::{SettlementErrorReason, TransactionReference};
use crate::scheme::SignedAuthorization;

/// Category of an on-chain refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    /// The payer's balance does not cover the amount.
    InsufficientFunds,
    /// The authorization (nonce) was already consumed.
    AuthorizationUsed,
    /// Execution reverted for another reason.
    Reverted,
    /// The transaction could not be included (fee market, mempool limits).
    Congested,
    /// The node refused to broadcast the transaction.
    Refused,
}

impl RejectionKind {
    /// The settlement reason this refusal is reported as.
    #[must_use]
    pub const fn reason(self) -> SettlementErrorReason {
        match self {
            Self::InsufficientFunds => SettlementErrorReason::InsufficientFunds,
            Self::AuthorizationUsed => SettlementErrorReason::AlreadySettled,
            Self::Reverted | Self::Congested | Self::Refused => {
                SettlementErrorReason::ChainRejected
            }
        }
    }

    /// Whether the same submission may succeed later.
    ///
    /// A transient refusal is reported but not recorded, so a retry submits again.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Congested)
    }
}

/// A definitive refusal by the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRejection {
    /// Category.
    pub kind: RejectionKind,
    /// Chain-specific detail.
    pub message: String,
}

impl ChainRejection {
    /// Creates a rejection.
    pub fn new<M: Into<String>>(kind: RejectionKind, message: M) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ChainRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Errors from a [`ChainClient`] call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The chain refused the transaction.
    #[error("chain rejected: {0}")]
    Rejected(ChainRejection),
    /// The chain could not be reached or answered garbage; the outcome is unknown.
    #[error("chain unavailable: {0}")]
    Unavailable(String),
}

/// Observed state of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Included and successful.
    Confirmed,
    /// Known to the chain but not final yet.
    Pending,
    /// Included and failed.
    Failed(ChainRejection),
    /// The chain has no record of it.
    NotFound,
}

/// Chain access used by the settlement engine.
///
/// Implementations are per network and must be safe to call concurrently.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Broadcasts the authorization and returns its transaction reference.
    async fn submit(
        &self,
        authorization: &SignedAuthorization,
    ) -> Result<TransactionReference, ChainError>;

    /// Current state of a submitted transaction.
    async fn query_status(
        &self,
        reference: &TransactionReference,
    ) -> Result<ChainOutcome, ChainError>;

    /// Finds an earlier on-chain submission of this authorization, if any.
    async fn find_submission(
        &self,
        authorization: &SignedAuthorization,
    ) -> Result<Option<TransactionReference>, ChainError>;
}

/// Per-network [`ChainClient`]s.
#[derive(Default, Clone)]
pub struct ChainRegistry(HashMap<ChainId, Arc<dyn ChainClient>>);

impl fmt::Debug for ChainRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut networks: Vec<String> = self.0.keys().map(ToString::to_string).collect();
        networks.sort_unstable();
        f.debug_tuple("ChainRegistry").field(&networks).finish()
    }
}

impl ChainRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the client for `network`, returning the one it replaced.
    pub fn insert(
        &mut self,
        network: ChainId,
        client: Arc<dyn ChainClient>,
    ) -> Option<Arc<dyn ChainClient>> {
        self.0.insert(network, client)
    }

    /// Builder form of [`ChainRegistry::insert`].
    #[must_use]
    pub fn with(mut self, network: ChainId, client: Arc<dyn ChainClient>) -> Self {
        self.0.insert(network, client);
        self
    }

    /// The client for `network`.
    #[must_use]
    pub fn get(&self, network: &ChainId) -> Option<&Arc<dyn ChainClient>> {
        self.0.get(network)
    }

    /// Networks with a client.
    pub fn networks(&self) -> impl Iterator<Item = &ChainId> {
        self.0.keys()
    }

    /// Number of clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no client is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
