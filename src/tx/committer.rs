//! Transaction committer: estimation, nonce assignment, signing and broadcast
//!
//! `send_tx` runs inside the sending account's nonce critical section and
//! recovers from a small set of node-reported failures:
//! - nonce drift: resync once from the node's pending nonce, then retry
//! - known transaction: skip to the next nonce and retry
//! - VM exception / invalid sender: the nonce is spent, advance and fail
//!
//! Everything else is returned to the caller as-is.

use super::classify::{classify_broadcast_error, BroadcastFailure};
use super::gas::{GasEstimate, GasEstimator};
use super::nonce::NonceCache;
use super::options::CommitterOptions;
use super::signer::TxSigner;
use crate::chain::EvmProvider;
use crate::error::{CommitterError, CommitterResult};

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Submits transactions from one account into an EVM-compatible network
#[async_trait]
pub trait EvmCommitter: Send + Sync {
    /// Sending account
    fn from_address(&self) -> Address;

    /// Node handle, for diagnostics
    fn provider(&self) -> Arc<dyn EvmProvider>;

    /// Advisory gas limit and price for calling `recipient` with `payload`
    async fn estimate_gas(&self, recipient: Address, payload: &Bytes)
        -> CommitterResult<GasEstimate>;

    /// Sign and broadcast, returning the transaction hash
    async fn send_tx(
        &self,
        recipient: Address,
        payload: Bytes,
        gas_limit: u64,
        gas_price: U256,
    ) -> CommitterResult<H256>;
}

/// Committer for a single sending account
pub struct EthCommitter {
    from_address: Address,
    signer: Arc<dyn TxSigner>,
    provider: Arc<dyn EvmProvider>,
    nonce_cache: Arc<NonceCache>,
    gas_estimator: GasEstimator,
    options: CommitterOptions,
}

impl EthCommitter {
    /// Create a committer and sync its nonce from the node.
    ///
    /// The nonce cache may be shared with other committers; each one only
    /// touches the entry of its own account.
    pub async fn new(
        from_address: Address,
        gas_price_adjustment: f64,
        gas_limit_adjustment: f64,
        signer: Arc<dyn TxSigner>,
        provider: Arc<dyn EvmProvider>,
        nonce_cache: Arc<NonceCache>,
        options: CommitterOptions,
    ) -> CommitterResult<Self> {
        options.validate()?;
        let gas_estimator = GasEstimator::new(
            gas_price_adjustment,
            gas_limit_adjustment,
            options.rpc_timeout,
        )?;

        let committer = Self {
            from_address,
            signer,
            provider,
            nonce_cache,
            gas_estimator,
            options,
        };

        let nonce = committer.resync_nonce().await?;
        info!(
            "Committer initialized for {:?} with pending nonce {}",
            from_address, nonce
        );

        Ok(committer)
    }

    /// Configured gas limit and price for callers that skip estimation
    pub fn fallback_gas(&self) -> GasEstimate {
        GasEstimate::new(self.options.gas_limit, self.options.gas_price)
    }

    /// Replace the cached nonce with the node's pending nonce
    async fn resync_nonce(&self) -> CommitterResult<u64> {
        let account = self.from_address;
        let provider = self.provider.clone();
        let rpc_timeout = self.options.rpc_timeout;

        self.nonce_cache
            .sync(account, || async move {
                timeout(rpc_timeout, provider.pending_nonce_at(account))
                    .await
                    .map_err(|_| CommitterError::Timeout {
                        operation: "pending nonce query".to_string(),
                    })?
                    .map_err(|e| CommitterError::NonceSync {
                        account,
                        message: e.to_string(),
                    })
            })
            .await
    }

    /// Build the unsigned legacy transaction for one attempt
    fn build_tx(
        &self,
        nonce: u64,
        recipient: Address,
        payload: &Bytes,
        gas_limit: u64,
        gas_price: U256,
    ) -> TypedTransaction {
        TransactionRequest::new()
            .from(self.from_address)
            .to(recipient)
            .value(U256::zero())
            .gas(gas_limit)
            .gas_price(gas_price)
            .nonce(nonce)
            .data(payload.clone())
            .into()
    }

    /// The send state machine. Must only run under the account lock.
    async fn send_locked(
        &self,
        recipient: Address,
        payload: &Bytes,
        gas_limit: u64,
        gas_price: U256,
    ) -> CommitterResult<H256> {
        let from = self.from_address;
        let mut nonce = match self.nonce_cache.get(from) {
            Some(nonce) => nonce,
            None => self.resync_nonce().await?,
        };
        let mut resync_used = false;
        let mut attempts = 0u32;
        let mut skipped = 0u64;

        loop {
            if attempts == self.options.max_attempts {
                error!(
                    "Giving up on {:?} after {} attempts at nonce {}",
                    from, attempts, nonce
                );
                return Err(CommitterError::RetriesExhausted {
                    account: from,
                    nonce,
                    attempts,
                    skipped,
                });
            }
            attempts += 1;

            let tx = self.build_tx(nonce, recipient, payload, gas_limit, gas_price);
            let signed = self
                .signer
                .sign_transaction(from, tx)
                .await
                .map_err(|e| CommitterError::Signing {
                    account: from,
                    nonce,
                    message: e.to_string(),
                })?;

            debug!(
                "Broadcasting tx {:?} from {:?} with nonce {} (attempt {})",
                signed.hash, from, nonce, attempts
            );

            let node_error =
                match timeout(self.options.rpc_timeout, self.provider.send_transaction(&signed))
                    .await
                {
                    Ok(Ok(node_hash)) => {
                        self.nonce_cache.incr(from);
                        let tx_hash = node_hash.unwrap_or(signed.hash);
                        info!(
                            "Transaction sent: {:?} from {:?} with nonce {}",
                            tx_hash, from, nonce
                        );
                        return Ok(tx_hash);
                    }
                    Ok(Err(e)) => e,
                    Err(_) => {
                        // No answer from the node: whether it took the tx is unknown
                        warn!(
                            "Broadcast of {:?} from {:?} with nonce {} timed out",
                            signed.hash, from, nonce
                        );
                        return Err(CommitterError::Timeout {
                            operation: format!("broadcast of nonce {} from {:?}", nonce, from),
                        });
                    }
                };

            let failure = classify_broadcast_error(&node_error.message);
            warn!(
                "sendTransaction failed for {:?} from {:?} with nonce {} ({}): {}",
                signed.hash,
                from,
                nonce,
                failure.as_str(),
                node_error
            );

            match failure {
                BroadcastFailure::InvalidSender => {
                    self.nonce_cache.incr(from);
                    return Err(CommitterError::InvalidSender {
                        account: from,
                        nonce,
                        message: node_error.message,
                    });
                }
                BroadcastFailure::NonceDrift => {
                    if resync_used {
                        error!(
                            "Nonces synced, but still wrong nonce {} for {:?}",
                            nonce, from
                        );
                        return Err(CommitterError::NonceMismatch {
                            account: from,
                            nonce,
                            message: node_error.message,
                        });
                    }

                    nonce = self.resync_nonce().await?;
                    resync_used = true;
                    crate::metrics::record_nonce_resync(from);
                    info!("Resynced nonce for {:?} to {}", from, nonce);
                }
                BroadcastFailure::KnownTransaction => {
                    nonce = self.nonce_cache.incr(from);
                    skipped += 1;
                    crate::metrics::record_nonce_skip(from);
                }
                BroadcastFailure::VmException => {
                    self.nonce_cache.incr(from);
                    return Err(CommitterError::Reverted {
                        account: from,
                        nonce,
                        tx_hash: node_error.tx_hash.unwrap_or(signed.hash),
                        message: node_error.message,
                    });
                }
                BroadcastFailure::Other => {
                    return Err(CommitterError::Broadcast {
                        account: from,
                        nonce,
                        message: node_error.message,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl EvmCommitter for EthCommitter {
    fn from_address(&self) -> Address {
        self.from_address
    }

    fn provider(&self) -> Arc<dyn EvmProvider> {
        self.provider.clone()
    }

    async fn estimate_gas(
        &self,
        recipient: Address,
        payload: &Bytes,
    ) -> CommitterResult<GasEstimate> {
        self.gas_estimator
            .estimate(self.provider.as_ref(), self.from_address, recipient, payload)
            .await
    }

    async fn send_tx(
        &self,
        recipient: Address,
        payload: Bytes,
        gas_limit: u64,
        gas_price: U256,
    ) -> CommitterResult<H256> {
        let from = self.from_address;
        let started = Instant::now();

        let result = self
            .nonce_cache
            .serialize(from, || {
                self.send_locked(recipient, &payload, gas_limit, gas_price)
            })
            .await;

        crate::metrics::record_send_latency(from, started.elapsed().as_secs_f64());
        match &result {
            Ok(_) => crate::metrics::record_tx_submitted(from),
            Err(e) => crate::metrics::record_tx_failed(from, e.kind()),
        }

        result
    }
}
