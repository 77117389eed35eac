//! Error types for the transaction committer

use ethers::types::{Address, H256, U256};
use thiserror::Error;

/// Main error type for the committer
#[derive(Error, Debug)]
pub enum CommitterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gas estimation error: {message}")]
    Estimation {
        message: String,
        /// Adjusted gas price, present when only the gas limit query failed
        gas_price: Option<U256>,
    },

    #[error("Failed to sign transaction from {account:?} with nonce {nonce}: {message}")]
    Signing {
        account: Address,
        nonce: u64,
        message: String,
    },

    #[error("Node rejected sender {account:?} at nonce {nonce}: {message}")]
    InvalidSender {
        account: Address,
        nonce: u64,
        message: String,
    },

    #[error("Nonce {nonce} mismatch for {account:?} after resync: {message}")]
    NonceMismatch {
        account: Address,
        nonce: u64,
        message: String,
    },

    #[error("Nonce sync failed for {account:?}: {message}")]
    NonceSync { account: Address, message: String },

    #[error("Transaction {tx_hash:?} from {account:?} with nonce {nonce} reverted: {message}")]
    Reverted {
        account: Address,
        nonce: u64,
        tx_hash: H256,
        message: String,
    },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Broadcast from {account:?} with nonce {nonce} failed: {message}")]
    Broadcast {
        account: Address,
        nonce: u64,
        message: String,
    },

    #[error(
        "Gave up on {account:?} after {attempts} attempts (last nonce {nonce}, {skipped} skipped)"
    )]
    RetriesExhausted {
        account: Address,
        nonce: u64,
        attempts: u32,
        /// Nonces passed over after known-transaction responses
        skipped: u64,
    },
}

impl CommitterError {
    /// Stable label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            CommitterError::Config(_) => "config",
            CommitterError::Estimation { .. } => "estimation",
            CommitterError::Signing { .. } | CommitterError::InvalidSender { .. } => "signing",
            CommitterError::NonceMismatch { .. } => "nonce_mismatch",
            CommitterError::NonceSync { .. } => "nonce_sync",
            CommitterError::Reverted { .. } => "reverted",
            CommitterError::Timeout { .. } => "timeout",
            CommitterError::Broadcast { .. } => "broadcast",
            CommitterError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CommitterError::Estimation { .. }
                | CommitterError::NonceSync { .. }
                | CommitterError::Timeout { .. }
        )
    }

    /// The call already moved the cached nonce on (a spent or skipped nonce),
    /// so an identical resubmission would not land where this one was aimed.
    pub fn nonce_consumed(&self) -> bool {
        match self {
            CommitterError::InvalidSender { .. } | CommitterError::Reverted { .. } => true,
            CommitterError::RetriesExhausted { skipped, .. } => *skipped > 0,
            _ => false,
        }
    }
}

/// Result type for committer operations
pub type CommitterResult<T> = Result<T, CommitterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverted_consumes_nonce_and_is_terminal() {
        let err = CommitterError::Reverted {
            account: Address::zero(),
            nonce: 7,
            tx_hash: H256::zero(),
            message: "VM Exception while processing transaction: revert".to_string(),
        };
        assert!(err.nonce_consumed());
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "reverted");
    }

    #[test]
    fn test_signing_variants_share_kind() {
        let local = CommitterError::Signing {
            account: Address::zero(),
            nonce: 1,
            message: "not authorized".to_string(),
        };
        let remote = CommitterError::InvalidSender {
            account: Address::zero(),
            nonce: 1,
            message: "invalid sender".to_string(),
        };
        assert_eq!(local.kind(), remote.kind());
        assert!(!local.nonce_consumed());
        assert!(remote.nonce_consumed());
    }

    #[test]
    fn test_exhausted_retries_after_skips_are_not_retryable() {
        let skipped = CommitterError::RetriesExhausted {
            account: Address::zero(),
            nonce: 7,
            attempts: 2,
            skipped: 2,
        };
        assert!(!skipped.is_retryable());
        assert!(skipped.nonce_consumed());

        let resynced_only = CommitterError::RetriesExhausted {
            account: Address::zero(),
            nonce: 9,
            attempts: 1,
            skipped: 0,
        };
        assert!(!resynced_only.nonce_consumed());
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = CommitterError::Timeout {
            operation: "send transaction".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Timeout waiting for send transaction");
    }
}
