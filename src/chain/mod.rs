//! Chain module - the node-facing side of the committer
//!
//! This module provides:
//! - The `EvmProvider` capability the committer consumes
//! - An ethers-backed provider with multi-RPC failover

pub mod provider;

pub use provider::ChainProvider;

use crate::tx::SignedTransaction;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, H256, U256};
use thiserror::Error;

/// Failure reported by the remote node.
///
/// Nodes communicate the kind of failure only through the message text, so
/// the message is kept verbatim for classification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct NodeError {
    pub message: String,
    /// Transaction hash echoed by the node alongside the error, if any
    pub tx_hash: Option<H256>,
}

impl NodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tx_hash: None,
        }
    }

    pub fn with_tx_hash(mut self, tx_hash: H256) -> Self {
        self.tx_hash = Some(tx_hash);
        self
    }
}

/// Chain queries and broadcast primitives of an EVM node
#[async_trait]
pub trait EvmProvider: Send + Sync {
    /// Suggested legacy gas price
    async fn suggest_gas_price(&self) -> Result<U256, NodeError>;

    /// Simulate a call and return the gas it would use
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, NodeError>;

    /// Next nonce for `account`, counting transactions still in the mempool
    async fn pending_nonce_at(&self, account: Address) -> Result<u64, NodeError>;

    /// Broadcast a signed transaction. Returns the hash reported by the node,
    /// if it reported one.
    async fn send_transaction(&self, tx: &SignedTransaction) -> Result<Option<H256>, NodeError>;
}
