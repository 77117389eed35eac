//! Transaction submission module with nonce management and gas estimation

mod classify;
mod committer;
mod gas;
mod nonce;
mod options;
mod signer;

pub use classify::{classify_broadcast_error, BroadcastFailure};
pub use committer::{EthCommitter, EvmCommitter};
pub use gas::{GasEstimate, GasEstimator};
pub use nonce::NonceCache;
pub use options::CommitterOptions;
pub use signer::{SignedTransaction, SignerError, TxSigner, WalletSigner};
