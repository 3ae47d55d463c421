//! Idempotent on-chain settlement of verified payments.
//!
//! Each [`VerifiedPayment`] carries a [`Fingerprint`]. The engine claims it in
//! a [`SettlementStore`] before touching the chain, so concurrent settles of
//! one authorization produce a single submission: the rest see
//! `AlreadyInFlight` or the recorded result.
//!
//! A settlement that runs past its deadline reports `Timeout` and leaves the
//! fingerprint unresolved. The next attempt asks the chain what happened
//! (by transaction reference, or by searching for the authorization) before
//! it submits anything again. One deadline covers both the reconciliation
//! and any resubmission.
//!
//! Recorded results and reconciliation do not depend on the authorization's
//! validity window: a retry after the window closed still gets the recorded
//! result or the chain's answer.

mod chain;
mod store;

pub use chain::{
    ChainClient, ChainError, ChainOutcome, ChainRegistry, ChainRejection, RejectionKind,
};
pub use store::{Claim, InMemorySettlementStore, SettlementStore};

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout_at};
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::chain::ChainId;
use crate::proto::{
    PaymentRequirements, SettlementErrorReason, SettlementResult, TransactionReference,
};
use crate::scheme::{Fingerprint, Rejection};
use crate::verify::{AuthenticatedPayment, VerificationEngine, VerifiedPayment};

macro_rules! traced {
    ($fut:expr, $span:expr) => {{
        #[cfg(feature = "telemetry")]
        {
            use tracing::Instrument;
            $fut.instrument($span).await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            $fut.await
        }
    }};
}

/// Tuning for [`SettlementEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementConfig {
    /// Settlement deadline; `None` uses each requirement's `maxTimeoutSeconds`.
    pub timeout_override: Option<Duration>,
    /// Delay between transaction status queries.
    pub poll_interval: Duration,
}

impl SettlementConfig {
    /// Default delay between status queries.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            timeout_override: None,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Settlement could not be attempted or its outcome cannot be reported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementFault {
    /// No [`ChainClient`] is configured for the payment's network.
    #[error("no chain client configured for network {0}")]
    NoChainClient(ChainId),
    /// The chain interface could not be reached.
    #[error("chain interface unavailable: {0}")]
    ChainUnavailable(String),
}

enum Outcome {
    Done(SettlementResult),
    /// Refused for now; reported without being recorded.
    Retryable(SettlementResult),
    TimedOut,
    Fault(SettlementFault),
}

/// Owns a claimed fingerprint until a result is recorded.
///
/// Dropping it unrecorded (an error path, or the caller abandoning the
/// future) marks the fingerprint unresolved so it is never stuck in flight.
struct ClaimGuard<'a> {
    store: &'a dyn SettlementStore,
    fingerprint: Fingerprint,
    reference: Option<TransactionReference>,
    released: bool,
}

impl<'a> ClaimGuard<'a> {
    fn new(
        store: &'a dyn SettlementStore,
        fingerprint: Fingerprint,
        reference: Option<TransactionReference>,
    ) -> Self {
        Self {
            store,
            fingerprint,
            reference,
            released: false,
        }
    }

    fn complete(mut self, result: SettlementResult) {
        self.released = true;
        self.store.complete(self.fingerprint, result);
    }

    fn release(mut self) {
        self.released = true;
        self.store.release(self.fingerprint);
    }

    fn unresolved(mut self) -> Option<TransactionReference> {
        self.released = true;
        let reference = self.reference.take();
        self.store
            .mark_unresolved(self.fingerprint, reference.clone());
        reference
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.store
                .mark_unresolved(self.fingerprint, self.reference.take());
        }
    }
}

/// Executes verified payments on-chain exactly once.
#[derive(Clone)]
pub struct SettlementEngine {
    chains: Arc<ChainRegistry>,
    store: Arc<dyn SettlementStore>,
    config: SettlementConfig,
}

impl std::fmt::Debug for SettlementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementEngine")
            .field("chains", &self.chains)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SettlementEngine {
    /// Creates an engine with default [`SettlementConfig`].
    #[must_use]
    pub fn new(chains: Arc<ChainRegistry>, store: Arc<dyn SettlementStore>) -> Self {
        Self {
            chains,
            store,
            config: SettlementConfig::default(),
        }
    }

    /// Creates an engine over a fresh [`InMemorySettlementStore`].
    #[must_use]
    pub fn in_memory(chains: ChainRegistry) -> Self {
        Self::new(Arc::new(chains), Arc::new(InMemorySettlementStore::new()))
    }

    /// Replaces the configuration.
    #[must_use]
    pub const fn with_config(mut self, config: SettlementConfig) -> Self {
        self.config = config;
        self
    }

    /// The chain clients settlements are sent through.
    #[must_use]
    pub const fn chains(&self) -> &Arc<ChainRegistry> {
        &self.chains
    }

    /// How long a settlement of `requirements` may wait for the chain.
    #[must_use]
    pub fn deadline_for(&self, requirements: &PaymentRequirements) -> Duration {
        self.config
            .timeout_override
            .unwrap_or_else(|| Duration::from_secs(requirements.max_timeout_seconds))
    }

    /// Settles a verified payment.
    ///
    /// Repeated calls with the same authorization return the recorded result
    /// without another submission.
    ///
    /// # Errors
    ///
    /// Returns [`SettlementFault`] if no chain client serves the network or
    /// the chain interface is unreachable. The fingerprint is then left
    /// unresolved and the next call reconciles with the chain first.
    pub async fn settle(
        &self,
        payment: &VerifiedPayment,
    ) -> Result<SettlementResult, SettlementFault> {
        self.run(payment.authenticated(), None).await
    }

    /// Settles a payment whose window has not been checked yet.
    ///
    /// A recorded result is returned and an unresolved attempt is reconciled
    /// whatever the clock says. Only a first submission goes through
    /// [`VerificationEngine::admit`]; if that fails the result is
    /// `InvalidPayment` and nothing is recorded.
    ///
    /// # Errors
    ///
    /// As [`settle`](Self::settle).
    pub async fn settle_authenticated(
        &self,
        payment: &AuthenticatedPayment,
        verifier: &VerificationEngine,
    ) -> Result<SettlementResult, SettlementFault> {
        self.run(payment, Some(verifier)).await
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "x402.settle",
            skip_all,
            fields(fingerprint = %payment.fingerprint(), network = %payment.requirements().network),
            err
        )
    )]
    async fn run(
        &self,
        payment: &AuthenticatedPayment,
        admission: Option<&VerificationEngine>,
    ) -> Result<SettlementResult, SettlementFault> {
        let network = &payment.requirements().network;
        let chain = self
            .chains
            .get(network)
            .ok_or_else(|| SettlementFault::NoChainClient(network.clone()))?;
        let fingerprint = payment.fingerprint();
        let deadline = Instant::now() + self.deadline_for(payment.requirements());

        let mut guard = match self.store.claim(fingerprint) {
            Claim::Settled(result) => return Ok(result),
            Claim::InFlight => {
                return Ok(failure(
                    payment,
                    SettlementErrorReason::AlreadyInFlight,
                    "another settlement of this authorization is in progress",
                    None,
                ));
            }
            Claim::Acquired => {
                let guard = ClaimGuard::new(&*self.store, fingerprint, None);
                if let Some(verifier) = admission
                    && let Err(rejection) = verifier.admit(payment)
                {
                    #[cfg(feature = "telemetry")]
                    tracing::info!(reason = %rejection.reason, "refusing to submit invalid payment");
                    guard.release();
                    return Ok(invalid_payment(network, rejection));
                }
                guard
            }
            Claim::Reconcile { reference } => {
                #[cfg(feature = "telemetry")]
                tracing::info!(reference = ?reference, "reconciling unresolved settlement");
                let mut guard = ClaimGuard::new(&*self.store, fingerprint, reference);
                match self.reconcile(chain.as_ref(), payment, &mut guard, deadline).await {
                    Ok(Some(outcome)) => return self.finish(payment, guard, outcome),
                    Ok(None) => guard,
                    Err(fault) => {
                        guard.unresolved();
                        return Err(fault);
                    }
                }
            }
        };

        let outcome = self.submit(chain.as_ref(), payment, &mut guard, deadline).await;
        self.finish(payment, guard, outcome)
    }

    fn finish(
        &self,
        payment: &AuthenticatedPayment,
        guard: ClaimGuard<'_>,
        outcome: Outcome,
    ) -> Result<SettlementResult, SettlementFault> {
        match outcome {
            Outcome::Done(result) => {
                guard.complete(result.clone());
                Ok(result)
            }
            Outcome::Retryable(result) => {
                guard.release();
                Ok(result)
            }
            Outcome::TimedOut => {
                let reference = guard.unresolved();
                #[cfg(feature = "telemetry")]
                tracing::warn!(reference = ?reference, "settlement deadline elapsed");
                Ok(failure(
                    payment,
                    SettlementErrorReason::Timeout,
                    format!(
                        "no outcome within {}s; the transfer may still land",
                        self.deadline_for(payment.requirements()).as_secs()
                    ),
                    reference,
                ))
            }
            Outcome::Fault(fault) => {
                guard.unresolved();
                Err(fault)
            }
        }
    }

    /// Asks the chain about an earlier attempt. `Ok(None)` means nothing was
    /// found and a fresh submission is safe.
    async fn reconcile(
        &self,
        chain: &dyn ChainClient,
        payment: &AuthenticatedPayment,
        guard: &mut ClaimGuard<'_>,
        deadline: Instant,
    ) -> Result<Option<Outcome>, SettlementFault> {
        let reference = if let Some(reference) = guard.reference.clone() {
            reference
        } else {
            let found = traced!(
                timeout_at(deadline, chain.find_submission(payment.authorization())),
                tracing::info_span!("chain.find_submission", otel.kind = "client")
            );
            match found {
                Err(_elapsed) => return Ok(Some(Outcome::TimedOut)),
                Ok(Err(e)) => return Err(SettlementFault::ChainUnavailable(e.to_string())),
                Ok(Ok(None)) => return Ok(None),
                Ok(Ok(Some(reference))) => {
                    guard.reference = Some(reference.clone());
                    reference
                }
            }
        };

        let status = traced!(
            timeout_at(deadline, chain.query_status(&reference)),
            tracing::info_span!("chain.query_status", otel.kind = "client")
        );
        match status {
            Err(_elapsed) => Ok(Some(Outcome::TimedOut)),
            Ok(Err(e)) => Err(SettlementFault::ChainUnavailable(e.to_string())),
            Ok(Ok(ChainOutcome::NotFound)) => {
                guard.reference = None;
                Ok(None)
            }
            Ok(Ok(ChainOutcome::Confirmed)) => Ok(Some(Outcome::Done(success(payment, reference)))),
            Ok(Ok(ChainOutcome::Failed(rejection))) => Ok(Some(Outcome::Done(failure(
                payment,
                rejection.kind.reason(),
                rejection.message,
                Some(reference),
            )))),
            Ok(Ok(ChainOutcome::Pending)) => Ok(Some(
                self.poll(chain, payment, reference, deadline).await,
            )),
        }
    }

    async fn submit(
        &self,
        chain: &dyn ChainClient,
        payment: &AuthenticatedPayment,
        guard: &mut ClaimGuard<'_>,
        deadline: Instant,
    ) -> Outcome {
        let submitted = traced!(
            timeout_at(deadline, chain.submit(payment.authorization())),
            tracing::info_span!("chain.submit", otel.kind = "client")
        );
        let reference = match submitted {
            Err(_elapsed) => return Outcome::TimedOut,
            Ok(Ok(reference)) => reference,
            Ok(Err(ChainError::Rejected(rejection))) => {
                return self.rejected(chain, payment, rejection, deadline).await;
            }
            Ok(Err(ChainError::Unavailable(message))) => {
                return Outcome::Fault(SettlementFault::ChainUnavailable(message));
            }
        };
        #[cfg(feature = "telemetry")]
        tracing::info!(reference = %reference, "settlement submitted");
        guard.reference = Some(reference.clone());
        self.poll(chain, payment, reference, deadline).await
    }

    async fn rejected(
        &self,
        chain: &dyn ChainClient,
        payment: &AuthenticatedPayment,
        rejection: ChainRejection,
        deadline: Instant,
    ) -> Outcome {
        if rejection.kind.is_transient() {
            return Outcome::Retryable(failure(
                payment,
                rejection.kind.reason(),
                rejection.message,
                None,
            ));
        }
        if rejection.kind != RejectionKind::AuthorizationUsed {
            return Outcome::Done(failure(
                payment,
                rejection.kind.reason(),
                rejection.message,
                None,
            ));
        }
        // Consumed on-chain: report the consuming transaction if it can be found.
        match timeout_at(deadline, chain.find_submission(payment.authorization())).await {
            Err(_elapsed) => Outcome::TimedOut,
            Ok(Ok(Some(reference))) => Outcome::Done(success(payment, reference)),
            Ok(Ok(None) | Err(_)) => Outcome::Done(failure(
                payment,
                SettlementErrorReason::AlreadySettled,
                rejection.message,
                None,
            )),
        }
    }

    async fn poll(
        &self,
        chain: &dyn ChainClient,
        payment: &AuthenticatedPayment,
        reference: TransactionReference,
        deadline: Instant,
    ) -> Outcome {
        loop {
            match timeout_at(deadline, chain.query_status(&reference)).await {
                Err(_elapsed) => return Outcome::TimedOut,
                Ok(Ok(ChainOutcome::Confirmed)) => {
                    return Outcome::Done(success(payment, reference));
                }
                Ok(Ok(ChainOutcome::Failed(rejection)) | Err(ChainError::Rejected(rejection))) => {
                    return Outcome::Done(failure(
                        payment,
                        rejection.kind.reason(),
                        rejection.message,
                        Some(reference),
                    ));
                }
                Ok(Ok(ChainOutcome::Pending | ChainOutcome::NotFound)) => {}
                Ok(Err(ChainError::Unavailable(_message))) => {
                    #[cfg(feature = "telemetry")]
                    tracing::warn!(error = %_message, "status query failed; retrying");
                }
            }
            if timeout_at(deadline, sleep(self.config.poll_interval))
                .await
                .is_err()
            {
                return Outcome::TimedOut;
            }
        }
    }
}

/// The answer for a payment refused before it reached the chain.
pub(crate) fn invalid_payment(network: &ChainId, rejection: Rejection) -> SettlementResult {
    SettlementResult::Failure {
        reason: SettlementErrorReason::InvalidPayment,
        message: Some(format!("{}: {}", rejection.reason, rejection.message)),
        payer: rejection.payer,
        transaction: None,
        network: network.clone(),
    }
}

fn success(payment: &AuthenticatedPayment, transaction: TransactionReference) -> SettlementResult {
    SettlementResult::Success {
        payer: payment.payer().to_owned(),
        transaction,
        network: payment.requirements().network.clone(),
    }
}

fn failure<M: Into<String>>(
    payment: &AuthenticatedPayment,
    reason: SettlementErrorReason,
    message: M,
    transaction: Option<TransactionReference>,
) -> SettlementResult {
    SettlementResult::Failure {
        reason,
        message: Some(message.into()),
        payer: Some(payment.payer().to_owned()),
        transaction,
        network: payment.requirements().network.clone(),
    }
}
