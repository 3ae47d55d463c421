//! Alloy-backed [`ChainClient`] for EVM settlement.
//!
//! Submits `transferWithAuthorization` through a wallet-enabled provider and
//! reads receipts and `AuthorizationUsed` logs back for reconciliation.
//! Receipts are not awaited here; the settlement engine polls
//! [`ChainClient::query_status`] under its own deadline.

use alloy_network::EthereumWallet;
use alloy_primitives::{Address, TxHash, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::Filter;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolEvent, sol};
use alloy_transport::TransportError;
use async_trait::async_trait;
use url::Url;
use x402_core::proto::TransactionReference;
use x402_core::scheme::SignedAuthorization;
use x402_core::settle::{ChainClient, ChainError, ChainOutcome, ChainRejection, RejectionKind};

use crate::exact::ExactEvmPayload;

sol! {
    /// The ERC-3009 subset settlement needs.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IEIP3009 {
        event AuthorizationUsed(address indexed authorizer, bytes32 indexed nonce);
        function authorizationState(address authorizer, bytes32 nonce) external view returns (bool);
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            bytes signature
        ) external;
    }
}

/// Awaits a future, optionally instrumenting it with a tracing span.
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

/// Settles EVM "exact" payments on one chain.
#[derive(Clone)]
pub struct EvmChainClient {
    provider: DynProvider,
    lookback_blocks: u64,
}

impl std::fmt::Debug for EvmChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmChainClient")
            .field("lookback_blocks", &self.lookback_blocks)
            .finish_non_exhaustive()
    }
}

impl EvmChainClient {
    /// How many blocks back [`ChainClient::find_submission`] searches by default.
    pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 5_000;

    /// Wraps a provider that can sign and send transactions.
    #[must_use]
    pub const fn new(provider: DynProvider) -> Self {
        Self {
            provider,
            lookback_blocks: Self::DEFAULT_LOOKBACK_BLOCKS,
        }
    }

    /// Connects to `rpc_url`, paying gas from `signer`.
    #[must_use]
    pub fn connect(rpc_url: Url, signer: PrivateKeySigner) -> Self {
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(rpc_url)
            .erased();
        Self::new(provider)
    }

    /// Sets how far back submissions are searched for.
    #[must_use]
    pub const fn with_lookback_blocks(mut self, blocks: u64) -> Self {
        self.lookback_blocks = blocks;
        self
    }

    /// The underlying provider.
    #[must_use]
    pub const fn provider(&self) -> &DynProvider {
        &self.provider
    }
}

fn decode(authorization: &SignedAuthorization) -> Result<(Address, ExactEvmPayload), ChainError> {
    let refused = |message: String| {
        ChainError::Rejected(ChainRejection::new(RejectionKind::Refused, message))
    };
    let asset: Address = authorization
        .asset
        .parse()
        .map_err(|_| refused(format!("asset {:?} is not an address", authorization.asset)))?;
    let payload: ExactEvmPayload = serde_json::from_value(authorization.payload.clone())
        .map_err(|e| refused(format!("undecodable EVM payload: {e}")))?;
    Ok((asset, payload))
}

fn unavailable(err: TransportError) -> ChainError {
    ChainError::Unavailable(err.to_string())
}

fn classify_transport(err: TransportError) -> ChainError {
    let Some(payload) = err.as_error_resp() else {
        return unavailable(err);
    };
    let message = payload.message.to_string();
    ChainError::Rejected(ChainRejection::new(classify_revert(&message), message))
}

fn classify_contract(err: alloy_contract::Error) -> ChainError {
    match err {
        alloy_contract::Error::TransportError(e) => classify_transport(e),
        alloy_contract::Error::PendingTransactionError(e) => ChainError::Unavailable(e.to_string()),
        other => ChainError::Rejected(ChainRejection::new(RejectionKind::Refused, other.to_string())),
    }
}

/// Maps a node's error or revert message onto a [`RejectionKind`].
#[must_use]
pub fn classify_revert(message: &str) -> RejectionKind {
    let message = message.to_ascii_lowercase();
    if message.contains("authorization is used") || message.contains("authorization is canceled") {
        RejectionKind::AuthorizationUsed
    } else if message.contains("insufficient funds for gas") {
        RejectionKind::Refused
    } else if message.contains("exceeds balance") || message.contains("insufficient balance") {
        RejectionKind::InsufficientFunds
    } else if message.contains("underpriced")
        || message.contains("nonce too low")
        || message.contains("txpool is full")
        || message.contains("already known")
    {
        RejectionKind::Congested
    } else if message.contains("revert") {
        RejectionKind::Reverted
    } else {
        RejectionKind::Refused
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    async fn submit(
        &self,
        authorization: &SignedAuthorization,
    ) -> Result<TransactionReference, ChainError> {
        let (asset, payload) = decode(authorization)?;
        let auth = payload.authorization;
        let contract = IEIP3009::new(asset, self.provider.clone());
        let call = contract.transferWithAuthorization(
            auth.from,
            auth.to,
            auth.value.into(),
            U256::from(auth.valid_after.as_secs()),
            U256::from(auth.valid_before.as_secs()),
            auth.nonce,
            payload.signature,
        );
        let pending = traced!(
            call.send(),
            tracing::info_span!("x402.evm.submit", network = %authorization.network, payer = %auth.from)
        )
        .map_err(classify_contract)?;

        #[cfg(feature = "telemetry")]
        tracing::info!(tx = %pending.tx_hash(), "transferWithAuthorization sent");

        Ok(TransactionReference(pending.tx_hash().to_string()))
    }

    async fn query_status(
        &self,
        reference: &TransactionReference,
    ) -> Result<ChainOutcome, ChainError> {
        let hash: TxHash = reference
            .0
            .parse()
            .map_err(|_| ChainError::Unavailable(format!("{reference} is not a transaction hash")))?;
        let receipt = traced!(
            self.provider.get_transaction_receipt(hash),
            tracing::debug_span!("x402.evm.receipt", tx = %hash)
        )
        .map_err(unavailable)?;
        match receipt {
            Some(receipt) if receipt.status() => Ok(ChainOutcome::Confirmed),
            Some(receipt) => Ok(ChainOutcome::Failed(ChainRejection::new(
                RejectionKind::Reverted,
                format!(
                    "transaction {hash} reverted in block {}",
                    receipt.block_number.unwrap_or_default()
                ),
            ))),
            None => {
                let transaction = self
                    .provider
                    .get_transaction_by_hash(hash)
                    .await
                    .map_err(unavailable)?;
                Ok(if transaction.is_some() {
                    ChainOutcome::Pending
                } else {
                    ChainOutcome::NotFound
                })
            }
        }
    }

    async fn find_submission(
        &self,
        authorization: &SignedAuthorization,
    ) -> Result<Option<TransactionReference>, ChainError> {
        let (asset, payload) = decode(authorization)?;
        let auth = payload.authorization;
        let contract = IEIP3009::new(asset, self.provider.clone());
        let used = contract
            .authorizationState(auth.from, auth.nonce)
            .call()
            .await
            .map_err(classify_contract)?;
        if !used {
            return Ok(None);
        }

        let latest = self.provider.get_block_number().await.map_err(unavailable)?;
        let filter = Filter::new()
            .address(asset)
            .event_signature(IEIP3009::AuthorizationUsed::SIGNATURE_HASH)
            .topic1(auth.from.into_word())
            .topic2(auth.nonce)
            .from_block(latest.saturating_sub(self.lookback_blocks));
        let logs = traced!(
            self.provider.get_logs(&filter),
            tracing::debug_span!("x402.evm.find_submission", payer = %auth.from)
        )
        .map_err(unavailable)?;

        #[cfg(feature = "telemetry")]
        if logs.is_empty() {
            tracing::warn!(payer = %auth.from, "authorization used but no log within lookback");
        }

        Ok(logs
            .iter()
            .find_map(|log| log.transaction_hash)
            .map(|hash| TransactionReference(hash.to_string())))
    }
}
