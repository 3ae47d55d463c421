//! A [`Facilitator`] that talks to a _remote_ x402 facilitator over HTTP.
//!
//! [`FacilitatorClient`] covers the `/verify`, `/settle` and `/supported`
//! endpoints, so a resource server can hand it to a
//! [`PaymentGate`](x402_core::server::PaymentGate) in place of an in-process
//! facilitator.
//!
//! ## Error Handling
//!
//! Every [`FacilitatorClientError`] names the call that failed. Through the
//! [`Facilitator`] trait it surfaces as [`FacilitatorError::Transport`].

use std::fmt::Display;
use std::time::{Duration, Instant};

use http::{HeaderMap, StatusCode};
use reqwest::Client;
use tokio::sync::RwLock;
use url::Url;
use x402_core::facilitator::{Facilitator, FacilitatorError};
use x402_core::proto::{
    FacilitatorRequest, SettlementResult, SupportedResponse, VerificationResult, X402Version,
};
use x402_core::scheme::BoxFuture;

#[cfg(feature = "telemetry")]
use tracing::{Span, instrument};

/// Remembers the last `/supported` answer for a fixed time.
///
/// A clone starts empty.
#[derive(Debug)]
pub struct SupportedCache {
    ttl: Duration,
    entry: RwLock<Option<(Instant, SupportedResponse)>>,
}

impl SupportedCache {
    /// An empty cache whose entries live for `ttl`.
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::const_new(None),
        }
    }

    /// The remembered answer, unless it has gone stale.
    pub async fn get(&self) -> Option<SupportedResponse> {
        match &*self.entry.read().await {
            Some((stored_at, response)) if stored_at.elapsed() < self.ttl => Some(response.clone()),
            _ => None,
        }
    }

    /// Remembers `response`, replacing any earlier answer.
    pub async fn set(&self, response: SupportedResponse) {
        *self.entry.write().await = Some((Instant::now(), response));
    }

    /// Forgets the remembered answer.
    pub async fn clear(&self) {
        *self.entry.write().await = None;
    }
}

impl Clone for SupportedCache {
    fn clone(&self) -> Self {
        Self::new(self.ttl)
    }
}

/// A client for a remote x402 facilitator.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    base_url: Url,
    verify_url: Url,
    settle_url: Url,
    supported_url: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
    supported_cache: SupportedCache,
}

/// Failure talking to a remote facilitator.
///
/// `context` names the call that failed, e.g. `"POST /settle"`.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    /// An endpoint address could not be formed.
    #[error("bad facilitator address ({context}): {source}")]
    Endpoint {
        /// What was being built.
        context: &'static str,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },
    /// The request or the response body did not make it across.
    #[error("{context} failed in transit: {source}")]
    Transport {
        /// Call that failed.
        context: &'static str,
        /// Underlying failure.
        #[source]
        source: reqwest::Error,
    },
    /// A 200 answer whose body is not the expected JSON.
    #[error("{context} returned an unreadable body: {source}")]
    Decode {
        /// Call that failed.
        context: &'static str,
        /// Underlying failure.
        #[source]
        source: reqwest::Error,
    },
    /// Any answer other than 200.
    #[error("{context} answered {status}: {body}")]
    Status {
        /// Call that failed.
        context: &'static str,
        /// Status received.
        status: StatusCode,
        /// Body received, as text.
        body: String,
    },
}

impl From<FacilitatorClientError> for FacilitatorError {
    fn from(error: FacilitatorClientError) -> Self {
        Self::Transport(Box::new(error))
    }
}

impl FacilitatorClient {
    /// Default TTL for the `/supported` cache (10 minutes).
    pub const DEFAULT_SUPPORTED_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

    /// Base URL of the facilitator.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The `./verify` URL relative to [`FacilitatorClient::base_url`].
    pub const fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    /// The `./settle` URL relative to [`FacilitatorClient::base_url`].
    pub const fn settle_url(&self) -> &Url {
        &self.settle_url
    }

    /// The `./supported` URL relative to [`FacilitatorClient::base_url`].
    pub const fn supported_url(&self) -> &Url {
        &self.supported_url
    }

    /// Custom headers sent with every request.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The per-request timeout, if any.
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Constructs a client from a base URL.
    ///
    /// `./verify`, `./settle` and `./supported` are resolved against it.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError::Endpoint`] if an endpoint URL cannot be built.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let endpoint = |context: &'static str| {
            base_url
                .join(context)
                .map_err(|source| FacilitatorClientError::Endpoint { context, source })
        };
        let verify_url = endpoint("./verify")?;
        let settle_url = endpoint("./settle")?;
        let supported_url = endpoint("./supported")?;
        Ok(Self {
            client: Client::new(),
            base_url,
            verify_url,
            settle_url,
            supported_url,
            headers: HeaderMap::new(),
            timeout: None,
            supported_cache: SupportedCache::new(Self::DEFAULT_SUPPORTED_CACHE_TTL),
        })
    }

    /// Attaches custom headers (e.g. an API key) to every request.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a timeout for every request.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the TTL of the `/supported` cache.
    #[must_use]
    pub fn with_supported_cache_ttl(mut self, ttl: Duration) -> Self {
        self.supported_cache = SupportedCache::new(ttl);
        self
    }

    /// Disables the `/supported` cache.
    #[must_use]
    pub fn without_supported_cache(self) -> Self {
        self.with_supported_cache_ttl(Duration::ZERO)
    }

    /// Sends `POST /verify`.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if the request fails or the answer is not a verdict.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.facilitator_client.verify", skip_all, err)
    )]
    pub async fn verify(
        &self,
        request: &FacilitatorRequest,
    ) -> Result<VerificationResult, FacilitatorClientError> {
        self.post_json(&self.verify_url, "POST /verify", request).await
    }

    /// Sends `POST /settle`.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if the request fails or the answer is not a settlement.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.facilitator_client.settle", skip_all, err)
    )]
    pub async fn settle(
        &self,
        request: &FacilitatorRequest,
    ) -> Result<SettlementResult, FacilitatorClientError> {
        self.post_json(&self.settle_url, "POST /settle", request).await
    }

    /// Sends `GET /supported`, bypassing the cache.
    async fn supported_inner(&self) -> Result<SupportedResponse, FacilitatorClientError> {
        self.get_json(&self.supported_url, "GET /supported").await
    }

    /// `GET /supported`, served from the cache while it is fresh.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if the request fails.
    pub async fn supported(&self) -> Result<SupportedResponse, FacilitatorClientError> {
        if let Some(response) = self.supported_cache.get().await {
            return Ok(response);
        }

        #[cfg(feature = "telemetry")]
        tracing::debug!("x402.facilitator_client.supported_cache_miss");

        let response = self.supported_inner().await?;
        self.supported_cache.set(response.clone()).await;
        Ok(response)
    }

    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorClientError>
    where
        T: serde::Serialize + Sync + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let request = self.client.post(url.clone()).json(payload);
        self.send(request, context).await
    }

    async fn get_json<R>(&self, url: &Url, context: &'static str) -> Result<R, FacilitatorClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        let request = self.client.get(url.clone());
        self.send(request, context).await
    }

    async fn send<R>(
        &self,
        mut request: reqwest::RequestBuilder,
        context: &'static str,
    ) -> Result<R, FacilitatorClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let transport = |source| FacilitatorClientError::Transport { context, source };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();

        let result = if status == StatusCode::OK {
            response
                .json::<R>()
                .await
                .map_err(|source| FacilitatorClientError::Decode { context, source })
        } else {
            let body = response.text().await.map_err(transport)?;
            Err(FacilitatorClientError::Status { context, status, body })
        };

        record_result_on_span(&result);
        result
    }
}

impl Facilitator for FacilitatorClient {
    fn verify<'a>(
        &'a self,
        request: &'a FacilitatorRequest,
    ) -> BoxFuture<'a, Result<VerificationResult, FacilitatorError>> {
        Box::pin(async move {
            X402Version::CURRENT.negotiate(request.x402_version)?;
            Ok(Self::verify(self, request).await?)
        })
    }

    fn settle<'a>(
        &'a self,
        request: &'a FacilitatorRequest,
    ) -> BoxFuture<'a, Result<SettlementResult, FacilitatorError>> {
        Box::pin(async move {
            X402Version::CURRENT.negotiate(request.x402_version)?;
            Ok(Self::settle(self, request).await?)
        })
    }

    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>> {
        Box::pin(async move { Ok(Self::supported(self).await?) })
    }
}

/// Parses a base URL, normalizing it to end in exactly one `/`.
impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_owned();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|source| FacilitatorClientError::Endpoint {
            context: "base url",
            source,
        })?;
        Self::try_new(url)
    }
}

impl TryFrom<String> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            tracing::warn!(error = %err, "request to facilitator failed");
        }
    }
}

#[cfg(not(feature = "telemetry"))]
const fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}
