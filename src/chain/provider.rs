//! Chain provider with multi-RPC support and automatic failover

use super::{EvmProvider, NodeError};
use crate::config::ChainConfig;
use crate::error::{CommitterError, CommitterResult};
use crate::tx::SignedTransaction;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: ChainConfig) -> CommitterResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(CommitterError::Config(format!(
                "No valid RPC providers for chain {}",
                config.chain_id
            )));
        }

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.config.chain_id, next);
    }

    /// Get chain ID
    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Get chain name
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

#[async_trait]
impl EvmProvider for ChainProvider {
    async fn suggest_gas_price(&self) -> Result<U256, NodeError> {
        let mut last_error = None;
        for _ in 0..self.http_providers.len() {
            match self.http().get_gas_price().await {
                Ok(price) => return Ok(price),
                Err(e) => {
                    warn!(
                        "Failed to get gas price from chain {}: {}",
                        self.config.chain_id, e
                    );
                    last_error = Some(e.to_string());
                    self.failover();
                }
            }
        }

        Err(NodeError::new(last_error.unwrap_or_else(|| {
            "All providers failed to suggest gas price".to_string()
        })))
    }

    // Simulation is not retried on other endpoints: a revert reproduces everywhere.
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, NodeError> {
        self.http()
            .estimate_gas(tx, None)
            .await
            .map_err(|e| NodeError::new(e.to_string()))
    }

    async fn pending_nonce_at(&self, account: Address) -> Result<u64, NodeError> {
        let mut last_error = None;
        for _ in 0..self.http_providers.len() {
            match self
                .http()
                .get_transaction_count(account, Some(BlockNumber::Pending.into()))
                .await
            {
                Ok(nonce) if nonce.bits() > 64 => {
                    return Err(NodeError::new(format!(
                        "Pending nonce {} for {:?} does not fit in u64",
                        nonce, account
                    )));
                }
                Ok(nonce) => return Ok(nonce.low_u64()),
                Err(e) => {
                    warn!(
                        "Failed to get pending nonce for {:?} from chain {}: {}",
                        account, self.config.chain_id, e
                    );
                    last_error = Some(e.to_string());
                    self.failover();
                }
            }
        }

        Err(NodeError::new(last_error.unwrap_or_else(|| {
            "All providers failed to return a pending nonce".to_string()
        })))
    }

    async fn send_transaction(&self, tx: &SignedTransaction) -> Result<Option<H256>, NodeError> {
        // Active endpoint only, no failover for broadcasts.
        let pending = self
            .http()
            .send_raw_transaction(tx.raw.clone())
            .await
            .map_err(|e| NodeError::new(e.to_string()))?;

        Ok(Some(pending.tx_hash()))
    }
}
