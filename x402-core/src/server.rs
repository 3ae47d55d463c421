//! Resource-server side of the exchange.
//!
//! [`PaymentGate`] knows which routes cost what. Given a request's
//! `X-PAYMENT` header it verifies and settles through a [`Facilitator`] and
//! returns either settlement evidence for the response or a 402 body with a
//! reason. It is framework-agnostic; HTTP glue lives in `x402-http`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::facilitator::{Facilitator, FacilitatorError};
use crate::proto::{
    FacilitatorRequest, PaymentRequired, PaymentRequirements, RequirementsError,
    SettlementErrorReason, SettlementResult, VerificationResult, X402Version, codec,
};

/// A paid request: the settlement and its `X-PAYMENT-RESPONSE` encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    /// The requirements entry the client paid.
    pub requirements: PaymentRequirements,
    /// The successful settlement.
    pub settlement: SettlementResult,
    /// Value for the `X-PAYMENT-RESPONSE` header.
    pub header: String,
}

/// Why a request was not let through.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The route is not protected; serve it without payment.
    #[error("route {0:?} is not protected")]
    UnprotectedRoute(String),
    /// Answer with HTTP 402 and this body.
    #[error("payment required: {}", .0.error.as_deref().unwrap_or("no payment provided"))]
    PaymentRequired(PaymentRequired),
    /// The facilitator could not give a verdict.
    #[error(transparent)]
    Facilitator(#[from] FacilitatorError),
    /// The settlement could not be encoded for the response header.
    #[error("failed to encode settlement: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Per-route payment requirements plus the facilitator that enforces them.
#[derive(Clone)]
pub struct PaymentGate {
    facilitator: Arc<dyn Facilitator>,
    routes: HashMap<String, Vec<PaymentRequirements>>,
    hold_timeout: Duration,
    version: X402Version,
}

impl std::fmt::Debug for PaymentGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGate")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("hold_timeout", &self.hold_timeout)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl PaymentGate {
    /// How long a request is held open waiting for settlement by default.
    pub const DEFAULT_HOLD_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a gate with no protected routes.
    #[must_use]
    pub fn new(facilitator: Arc<dyn Facilitator>) -> Self {
        Self {
            facilitator,
            routes: HashMap::new(),
            hold_timeout: Self::DEFAULT_HOLD_TIMEOUT,
            version: X402Version::CURRENT,
        }
    }

    /// Protects `route` with the given alternatives.
    ///
    /// # Errors
    ///
    /// Returns the first [`RequirementsError`] among `accepts`.
    pub fn protect<R: Into<String>>(
        mut self,
        route: R,
        accepts: Vec<PaymentRequirements>,
    ) -> Result<Self, RequirementsError> {
        for requirements in &accepts {
            requirements.validate()?;
        }
        self.routes.insert(route.into(), accepts);
        Ok(self)
    }

    /// Sets how long a request may wait for settlement.
    ///
    /// Independent of `maxTimeoutSeconds`, which bounds the facilitator.
    #[must_use]
    pub const fn with_hold_timeout(mut self, hold_timeout: Duration) -> Self {
        self.hold_timeout = hold_timeout;
        self
    }

    /// The requirements protecting `route`.
    #[must_use]
    pub fn requirements_for(&self, route: &str) -> Option<&[PaymentRequirements]> {
        self.routes.get(route).map(Vec::as_slice)
    }

    /// The 402 body for `route`.
    #[must_use]
    pub fn payment_required(&self, route: &str, error: Option<String>) -> Option<PaymentRequired> {
        self.requirements_for(route).map(|accepts| PaymentRequired {
            x402_version: self.version,
            accepts: accepts.to_vec(),
            error,
        })
    }

    /// Verifies and settles the payment in `header` for `route`.
    ///
    /// # Errors
    ///
    /// [`GateError::PaymentRequired`] for anything the client can fix by
    /// paying (again); the other variants for server-side failures.
    pub async fn process(&self, route: &str, header: Option<&str>) -> Result<Settled, GateError> {
        let accepts = self
            .requirements_for(route)
            .ok_or_else(|| GateError::UnprotectedRoute(route.to_owned()))?;
        let refuse = |error: String| GateError::PaymentRequired(PaymentRequired {
            x402_version: self.version,
            accepts: accepts.to_vec(),
            error: Some(error),
        });

        let header = header.ok_or_else(|| refuse("X-PAYMENT header is required".to_owned()))?;
        let payload = codec::decode(header).map_err(|e| refuse(format!("invalid payment header: {e}")))?;
        self.version
            .negotiate(payload.x402_version)
            .map_err(|e| refuse(e.to_string()))?;
        let requirements = accepts
            .iter()
            .find(|r| r.scheme == payload.scheme && r.network == payload.network)
            .ok_or_else(|| {
                refuse(format!(
                    "no accepted requirements for scheme {:?} on {}",
                    payload.scheme, payload.network
                ))
            })?;

        let request = FacilitatorRequest::new(requirements.clone(), payload);
        // A closed window may still name a recorded settlement; settle decides.
        if let VerificationResult::Invalid { reason, message, .. } =
            self.facilitator.verify(&request).await?
            && !reason.is_validity_window()
        {
            return Err(refuse(match message {
                Some(message) => format!("{reason}: {message}"),
                None => reason.to_string(),
            }));
        }

        let settlement = tokio::time::timeout(self.hold_timeout, self.facilitator.settle(&request))
            .await
            .map_err(|_elapsed| refuse("Timeout: settlement did not finish in time".to_owned()))??;
        if let SettlementResult::Failure { reason, message, .. } = &settlement {
            return Err(refuse(match message {
                Some(message) if *reason == SettlementErrorReason::InvalidPayment => message.clone(),
                Some(message) => format!("{reason}: {message}"),
                None => reason.to_string(),
            }));
        }

        #[cfg(feature = "telemetry")]
        tracing::info!(route, transaction = ?settlement.transaction(), "payment settled");

        let header = codec::encode_settlement(&settlement)?;
        Ok(Settled {
            requirements: requirements.clone(),
            settlement,
            header,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facilitator::LocalFacilitator;
    use crate::settle::SettlementEngine;
    use crate::testing::{
        InstantChain, NOW, engine, fresh_payload, instant_settler, payload_with, requirements,
    };

    fn gate(chain: &Arc<InstantChain>) -> PaymentGate {
        gate_over(instant_settler(chain))
    }

    fn gate_over(settler: SettlementEngine) -> PaymentGate {
        let facilitator = LocalFacilitator::new(engine(), settler);
        PaymentGate::new(Arc::new(facilitator))
            .protect("/premium", vec![requirements()])
            .unwrap()
    }

    fn refusal(err: GateError) -> PaymentRequired {
        match err {
            GateError::PaymentRequired(body) => body,
            other => panic!("expected 402, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_paid_request_gets_settlement_header() {
        let chain = Arc::new(InstantChain::default());
        let header = codec::encode(&fresh_payload(1000, "n1")).unwrap();
        let settled = gate(&chain).process("/premium", Some(&header)).await.unwrap();
        assert!(settled.settlement.is_success());
        assert_eq!(codec::decode_settlement(&settled.header).unwrap(), settled.settlement);
        assert_eq!(chain.submissions(), 1);
    }

    #[tokio::test]
    async fn test_missing_header_yields_402_with_accepts() {
        let chain = Arc::new(InstantChain::default());
        let body = refusal(gate(&chain).process("/premium", None).await.unwrap_err());
        assert_eq!(body.accepts, vec![requirements()]);
        assert!(body.error.is_some());
    }

    #[tokio::test]
    async fn test_underpayment_yields_402_with_reason() {
        let chain = Arc::new(InstantChain::default());
        let header = codec::encode(&fresh_payload(999, "n1")).unwrap();
        let body = refusal(gate(&chain).process("/premium", Some(&header)).await.unwrap_err());
        assert!(body.error.unwrap().starts_with("AmountMismatch"));
        assert_eq!(chain.submissions(), 0);
    }

    #[tokio::test]
    async fn test_retried_header_replays_recorded_settlement() {
        let chain = Arc::new(InstantChain::default());
        let gate = gate(&chain);
        let header = codec::encode(&fresh_payload(1000, "n1")).unwrap();
        let first = gate.process("/premium", Some(&header)).await.unwrap();
        let second = gate.process("/premium", Some(&header)).await.unwrap();
        assert_eq!(first.settlement, second.settlement);
        assert_eq!(chain.submissions(), 1);
    }

    #[tokio::test]
    async fn test_retried_header_replays_after_expiry() {
        let chain = Arc::new(InstantChain::default());
        let settler = instant_settler(&chain);
        let gate = gate_over(settler.clone());
        let payload = payload_with(1000, "n1");
        let verified = engine().check_at(&requirements(), &payload, NOW).unwrap();
        let recorded = settler.settle(&verified).await.unwrap();

        let header = codec::encode(&payload).unwrap();
        let replayed = gate.process("/premium", Some(&header)).await.unwrap();
        assert_eq!(replayed.settlement, recorded);
        assert_eq!(chain.submissions(), 1);

        let header = codec::encode(&payload_with(1000, "n2")).unwrap();
        let body = refusal(gate.process("/premium", Some(&header)).await.unwrap_err());
        assert!(body.error.unwrap().starts_with("Expired"));
        assert_eq!(chain.submissions(), 1);
    }

    #[tokio::test]
    async fn test_garbage_header_and_unprotected_route() {
        let chain = Arc::new(InstantChain::default());
        let gate = gate(&chain);
        let body = refusal(gate.process("/premium", Some("%%%")).await.unwrap_err());
        assert!(body.error.unwrap().contains("invalid payment header"));
        assert!(matches!(
            gate.process("/free", None).await,
            Err(GateError::UnprotectedRoute(_))
        ));
        assert!(gate.payment_required("/free", None).is_none());
    }
}
