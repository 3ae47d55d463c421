use std::sync::Arc;

use super::{SchemeClient, SigningError};
use crate::proto::{PaymentPayload, PaymentRequired, PaymentRequirements, X402Version};

/// Errors from [`PaymentClient::pay`].
#[derive(Debug, thiserror::Error)]
pub enum PaymentClientError {
    /// The server speaks a protocol version this client does not.
    #[error("server advertises unsupported x402Version {0}")]
    UnsupportedVersion(X402Version),
    /// No `accepts` entry matches a registered scheme client.
    #[error("no acceptable payment option among {0} offered")]
    NoMatchingRequirements(usize),
    /// The selected scheme client failed to sign.
    #[error(transparent)]
    Signing(#[from] SigningError),
}

/// Client-side payment construction over a set of [`SchemeClient`]s.
///
/// Entries of a 402 response are tried in the server's order; the first one
/// whose `(scheme, namespace)` has a registered client is paid.
#[derive(Clone, Default)]
pub struct PaymentClient {
    schemes: Vec<Arc<dyn SchemeClient>>,
}

impl std::fmt::Debug for PaymentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self
            .schemes
            .iter()
            .map(|s| format!("{}:{}", s.namespace(), s.scheme()))
            .collect();
        f.debug_struct("PaymentClient").field("schemes", &keys).finish()
    }
}

impl PaymentClient {
    /// Creates a client with no schemes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scheme client.
    #[must_use]
    pub fn with_scheme<C: SchemeClient + 'static>(mut self, client: C) -> Self {
        self.schemes.push(Arc::new(client));
        self
    }

    /// Adds a shared scheme client.
    #[must_use]
    pub fn with_shared_scheme(mut self, client: Arc<dyn SchemeClient>) -> Self {
        self.schemes.push(client);
        self
    }

    /// Picks the first payable entry of `accepts`.
    #[must_use]
    pub fn select<'a>(
        &self,
        accepts: &'a [PaymentRequirements],
    ) -> Option<(&'a PaymentRequirements, &Arc<dyn SchemeClient>)> {
        accepts.iter().find_map(|requirements| {
            self.schemes
                .iter()
                .find(|client| {
                    client.scheme() == requirements.scheme
                        && client.namespace() == requirements.network.namespace()
                })
                .map(|client| (requirements, client))
        })
    }

    /// Builds a payload for the first payable entry of a 402 response.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentClientError`] if the version is unsupported, nothing
    /// matches, or signing fails.
    pub async fn pay(
        &self,
        required: &PaymentRequired,
    ) -> Result<(PaymentRequirements, PaymentPayload), PaymentClientError> {
        if !required.x402_version.is_supported() {
            return Err(PaymentClientError::UnsupportedVersion(required.x402_version));
        }
        let (requirements, client) = self
            .select(&required.accepts)
            .ok_or(PaymentClientError::NoMatchingRequirements(required.accepts.len()))?;
        let payload = client.build_authorization(requirements).await?;
        Ok((requirements.clone(), payload))
    }
}
