//! The facilitator role: verify and settle on a resource server's behalf.
//!
//! [`Facilitator`] is object-safe so servers can hold either the in-process
//! [`LocalFacilitator`] or a remote client (see `x402-http`) behind one type.

use std::sync::Arc;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::proto::{
    FacilitatorRequest, SettlementResult, SupportedResponse, UnsupportedVersion,
    VerificationResult,
};
use crate::scheme::BoxFuture;
use crate::settle::{SettlementEngine, SettlementFault, invalid_payment};
use crate::verify::VerificationEngine;

/// Errors a facilitator reports instead of a verdict.
///
/// Invalid payments and failed settlements are verdicts, not errors; these
/// are the cases where no verdict can be given.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorError {
    /// The request declares a protocol version that is not accepted.
    #[error(transparent)]
    UnsupportedVersion(#[from] UnsupportedVersion),
    /// Settlement could not run.
    #[error(transparent)]
    Settlement(#[from] SettlementFault),
    /// A remote facilitator could not be reached or answered garbage.
    #[error("facilitator transport error: {0}")]
    Transport(Box<dyn std::error::Error + Send + Sync>),
}

/// Verifies and settles payments.
pub trait Facilitator: Send + Sync {
    /// Verifies a payload against its requirements.
    fn verify<'a>(
        &'a self,
        request: &'a FacilitatorRequest,
    ) -> BoxFuture<'a, Result<VerificationResult, FacilitatorError>>;

    /// Verifies, then settles a valid payment on-chain.
    ///
    /// A payment settled before is answered from the record even once its
    /// validity window has closed.
    fn settle<'a>(
        &'a self,
        request: &'a FacilitatorRequest,
    ) -> BoxFuture<'a, Result<SettlementResult, FacilitatorError>>;

    /// The (version, scheme, network) combinations handled.
    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>>;
}

impl<T: Facilitator + ?Sized> Facilitator for Arc<T> {
    fn verify<'a>(
        &'a self,
        request: &'a FacilitatorRequest,
    ) -> BoxFuture<'a, Result<VerificationResult, FacilitatorError>> {
        (**self).verify(request)
    }

    fn settle<'a>(
        &'a self,
        request: &'a FacilitatorRequest,
    ) -> BoxFuture<'a, Result<SettlementResult, FacilitatorError>> {
        (**self).settle(request)
    }

    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>> {
        (**self).supported()
    }
}

/// In-process facilitator over a [`VerificationEngine`] and a [`SettlementEngine`].
#[derive(Debug, Clone)]
pub struct LocalFacilitator {
    verifier: VerificationEngine,
    settler: SettlementEngine,
}

impl LocalFacilitator {
    /// Creates a facilitator.
    #[must_use]
    pub const fn new(verifier: VerificationEngine, settler: SettlementEngine) -> Self {
        Self { verifier, settler }
    }

    /// The verification engine.
    #[must_use]
    pub const fn verifier(&self) -> &VerificationEngine {
        &self.verifier
    }

    /// The settlement engine.
    #[must_use]
    pub const fn settler(&self) -> &SettlementEngine {
        &self.settler
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.facilitator.settle", skip_all, err)
    )]
    async fn settle_request(
        &self,
        request: &FacilitatorRequest,
    ) -> Result<SettlementResult, FacilitatorError> {
        self.verifier.version().negotiate(request.x402_version)?;
        let payment = match self.verifier.authenticate(&request.requirements, &request.payload) {
            Ok(payment) => payment,
            Err(rejection) => {
                #[cfg(feature = "telemetry")]
                tracing::info!(reason = %rejection.reason, "refusing to settle invalid payment");
                return Ok(invalid_payment(&request.requirements.network, rejection));
            }
        };
        Ok(self.settler.settle_authenticated(&payment, &self.verifier).await?)
    }
}

impl Facilitator for LocalFacilitator {
    fn verify<'a>(
        &'a self,
        request: &'a FacilitatorRequest,
    ) -> BoxFuture<'a, Result<VerificationResult, FacilitatorError>> {
        Box::pin(async move {
            self.verifier.version().negotiate(request.x402_version)?;
            Ok(self.verifier.verify(&request.requirements, &request.payload))
        })
    }

    fn settle<'a>(
        &'a self,
        request: &'a FacilitatorRequest,
    ) -> BoxFuture<'a, Result<SettlementResult, FacilitatorError>> {
        Box::pin(self.settle_request(request))
    }

    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>> {
        Box::pin(async move { Ok(self.verifier.registry().supported()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{InvalidReason, SettlementErrorReason, TransactionReference, X402Version};
    use crate::settle::ChainRegistry;
    use crate::testing::{
        InstantChain, NOW, engine, fresh_payload, instant_settler, payload_with, requirements,
    };

    fn facilitator(chain: &Arc<InstantChain>) -> LocalFacilitator {
        LocalFacilitator::new(engine(), instant_settler(chain))
    }

    #[tokio::test]
    async fn test_verify_then_settle() {
        let chain = Arc::new(InstantChain::default());
        let facilitator = facilitator(&chain);
        let request = FacilitatorRequest::new(requirements(), fresh_payload(1000, "n1"));

        let verdict = facilitator.verify(&request).await.unwrap();
        assert!(verdict.is_valid());
        assert_eq!(chain.submissions(), 0);

        let settled = facilitator.settle(&request).await.unwrap();
        assert!(settled.is_success());
        assert_eq!(settled.transaction(), Some(&TransactionReference("0xtx0".into())));
    }

    #[tokio::test]
    async fn test_invalid_payment_is_never_submitted() {
        let chain = Arc::new(InstantChain::default());
        let facilitator = facilitator(&chain);
        let request = FacilitatorRequest::new(requirements(), fresh_payload(999, "n1"));

        let verdict = facilitator.verify(&request).await.unwrap();
        assert_eq!(verdict.invalid_reason(), Some(InvalidReason::AmountMismatch));

        let settled = facilitator.settle(&request).await.unwrap();
        assert_eq!(
            settled.error_reason(),
            Some(SettlementErrorReason::InvalidPayment)
        );
        let SettlementResult::Failure { message, .. } = settled else {
            panic!("expected failure");
        };
        assert!(message.unwrap().starts_with("AmountMismatch"));
        assert_eq!(chain.submissions(), 0);
    }

    #[tokio::test]
    async fn test_repeat_settle_after_expiry_replays_the_record() {
        let chain = Arc::new(InstantChain::default());
        let settler = instant_settler(&chain);
        let facilitator = LocalFacilitator::new(engine(), settler.clone());
        // Valid until NOW + 60: settled while valid, repeated long after.
        let request = FacilitatorRequest::new(requirements(), payload_with(1000, "n1"));
        let verified = engine()
            .check_at(&request.requirements, &request.payload, NOW)
            .unwrap();
        let first = settler.settle(&verified).await.unwrap();

        let verdict = facilitator.verify(&request).await.unwrap();
        assert_eq!(verdict.invalid_reason(), Some(InvalidReason::Expired));
        let second = facilitator.settle(&request).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(chain.submissions(), 1);
    }

    #[tokio::test]
    async fn test_expired_payment_is_never_submitted() {
        let chain = Arc::new(InstantChain::default());
        let facilitator = facilitator(&chain);
        let request = FacilitatorRequest::new(requirements(), payload_with(1000, "n1"));
        let settled = facilitator.settle(&request).await.unwrap();
        assert_eq!(
            settled.error_reason(),
            Some(SettlementErrorReason::InvalidPayment)
        );
        assert_eq!(chain.submissions(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_request_version_is_an_error() {
        let chain = Arc::new(InstantChain::default());
        let facilitator = facilitator(&chain);
        let mut request = FacilitatorRequest::new(requirements(), fresh_payload(1000, "n1"));
        request.x402_version = X402Version(2);
        assert!(matches!(
            facilitator.verify(&request).await,
            Err(FacilitatorError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            facilitator.settle(&request).await,
            Err(FacilitatorError::UnsupportedVersion(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_chain_client_is_a_fault() {
        let facilitator = LocalFacilitator::new(
            engine(),
            SettlementEngine::in_memory(ChainRegistry::new()),
        );
        let request = FacilitatorRequest::new(requirements(), fresh_payload(1000, "n1"));
        assert!(matches!(
            facilitator.settle(&request).await,
            Err(FacilitatorError::Settlement(SettlementFault::NoChainClient(_)))
        ));
    }

    #[tokio::test]
    async fn test_supported_lists_registry() {
        let chain = Arc::new(InstantChain::default());
        let supported = facilitator(&chain).supported().await.unwrap();
        assert_eq!(supported.kinds.len(), 1);
        assert_eq!(supported.kinds[0].scheme, "exact");
        assert!(supported.kinds[0].network.is_wildcard());
    }
}
