//! EVM transaction committer
//!
//! Estimates gas, assigns gap-free nonces per sending account, signs and
//! broadcasts transactions to EVM-compatible networks, recovering from nonce
//! drift and duplicate submissions reported by the node.

pub mod chain;
pub mod config;
pub mod error;
pub mod metrics;
pub mod tx;

pub use chain::{ChainProvider, EvmProvider, NodeError};
pub use error::{CommitterError, CommitterResult};
pub use tx::{
    CommitterOptions, EthCommitter, EvmCommitter, GasEstimate, NonceCache, SignedTransaction,
    TxSigner, WalletSigner,
};
