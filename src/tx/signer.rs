//! Transaction signing capability and its local-wallet implementation

use crate::error::{CommitterError, CommitterResult};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer, WalletError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Signature, H256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Signer {signer:?} is not authorized to sign for {from:?}")]
    NotAuthorized { from: Address, signer: Address },

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
}

/// A signed transaction ready for broadcast
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub tx: TypedTransaction,
    pub signature: Signature,
    /// RLP encoding of the signed transaction
    pub raw: Bytes,
    /// Locally computed transaction hash
    pub hash: H256,
}

impl SignedTransaction {
    pub fn new(tx: TypedTransaction, signature: Signature) -> Self {
        let raw = tx.rlp_signed(&signature);
        let hash = tx.hash(&signature);
        Self {
            tx,
            signature,
            raw,
            hash,
        }
    }

    /// Nonce carried by the transaction
    pub fn nonce(&self) -> Option<u64> {
        self.tx.nonce().map(|n| n.low_u64())
    }
}

/// Capability bound to one private key
#[async_trait]
pub trait TxSigner: Send + Sync {
    /// Address of the key this signer holds
    fn address(&self) -> Address;

    /// Sign `tx` on behalf of `from`
    async fn sign_transaction(
        &self,
        from: Address,
        tx: TypedTransaction,
    ) -> Result<SignedTransaction, SignerError>;
}

/// Signer backed by an in-process private key
#[derive(Debug, Clone)]
pub struct WalletSigner {
    wallet: LocalWallet,
}

impl WalletSigner {
    /// Create a signer bound to `chain_id`
    pub fn new(wallet: LocalWallet, chain_id: u64) -> Self {
        Self {
            wallet: wallet.with_chain_id(chain_id),
        }
    }

    /// Load the private key from the environment variable `var_name`
    pub fn from_env(var_name: &str, chain_id: u64) -> CommitterResult<Self> {
        let key = std::env::var(var_name).map_err(|_| {
            CommitterError::Config(format!(
                "No wallet configured. Set {} to a hex private key",
                var_name
            ))
        })?;

        let wallet = key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| CommitterError::Config(format!("Invalid private key: {}", e)))?;

        Ok(Self::new(wallet, chain_id))
    }

    pub fn chain_id(&self) -> u64 {
        self.wallet.chain_id()
    }
}

#[async_trait]
impl TxSigner for WalletSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_transaction(
        &self,
        from: Address,
        mut tx: TypedTransaction,
    ) -> Result<SignedTransaction, SignerError> {
        if from != self.wallet.address() {
            return Err(SignerError::NotAuthorized {
                from,
                signer: self.wallet.address(),
            });
        }

        // The raw encoding and hash must carry the same chain id as the EIP-155 signature
        tx.set_chain_id(self.wallet.chain_id());
        let signature = self.wallet.sign_transaction(&tx).await?;

        Ok(SignedTransaction::new(tx, signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::TransactionRequest;

    // Well-known development key (anvil account 0)
    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn signer() -> WalletSigner {
        WalletSigner::new(DEV_KEY.parse().unwrap(), 31337)
    }

    fn legacy_tx(nonce: u64) -> TypedTransaction {
        TransactionRequest::new()
            .to(Address::repeat_byte(0x42))
            .value(0u64)
            .gas(21_000u64)
            .gas_price(1_000_000_000u64)
            .nonce(nonce)
            .data(vec![0xde, 0xad])
            .into()
    }

    #[tokio::test]
    async fn test_signs_for_own_address() {
        let signer = signer();
        let signed = signer
            .sign_transaction(signer.address(), legacy_tx(3))
            .await
            .unwrap();

        assert_eq!(signed.nonce(), Some(3));
        assert_eq!(signed.tx.chain_id().map(|id| id.as_u64()), Some(31337));
        assert_eq!(signed.hash, H256::from(ethers::utils::keccak256(&signed.raw)));
        assert_eq!(signed.signature.recover(signed.tx.sighash()).unwrap(), signer.address());
    }

    #[tokio::test]
    async fn test_refuses_foreign_sender() {
        let signer = signer();
        let err = signer
            .sign_transaction(Address::repeat_byte(0x01), legacy_tx(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SignerError::NotAuthorized { .. }));
    }

    #[test]
    fn test_from_env_requires_variable() {
        let err = WalletSigner::from_env("COMMITTER_TEST_MISSING_KEY", 1).unwrap_err();
        assert!(matches!(err, CommitterError::Config(_)));

        std::env::set_var("COMMITTER_TEST_PRESENT_KEY", DEV_KEY);
        let signer = WalletSigner::from_env("COMMITTER_TEST_PRESENT_KEY", 5).unwrap();
        assert_eq!(signer.chain_id(), 5);
    }
}
