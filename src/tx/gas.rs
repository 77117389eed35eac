//! Gas estimation with configurable adjustment factors

use crate::chain::EvmProvider;
use crate::error::{CommitterError, CommitterResult};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Fixed-point scale for prices too large to multiply exactly as f64
const PRICE_SCALE: u64 = 1_000_000_000;

/// Integers up to this many bits convert to f64 exactly
const F64_EXACT_BITS: usize = 53;

/// Gas limit and price for one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasEstimate {
    pub gas_limit: u64,
    pub gas_price: U256,
}

impl GasEstimate {
    pub fn new(gas_limit: u64, gas_price: U256) -> Self {
        Self {
            gas_limit,
            gas_price,
        }
    }

    /// Upper bound on the fee in wei, `gas_limit * gas_price`
    pub fn cost(&self) -> U256 {
        U256::from(self.gas_limit).saturating_mul(self.gas_price)
    }
}

/// Gas estimator for transactions
#[derive(Debug, Clone)]
pub struct GasEstimator {
    /// Multiplier applied to the node's suggested gas price
    gas_price_adjustment: f64,
    /// Multiplier applied to the node's simulated gas usage
    gas_limit_adjustment: f64,
    /// Deadline for each node query
    rpc_timeout: Duration,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new(
        gas_price_adjustment: f64,
        gas_limit_adjustment: f64,
        rpc_timeout: Duration,
    ) -> CommitterResult<Self> {
        for (name, factor) in [
            ("gas price", gas_price_adjustment),
            ("gas limit", gas_limit_adjustment),
        ] {
            if !factor.is_finite() || factor <= 0.0 {
                return Err(CommitterError::Config(format!(
                    "Invalid {} adjustment: {}",
                    name, factor
                )));
            }
        }

        Ok(Self {
            gas_price_adjustment,
            gas_limit_adjustment,
            rpc_timeout,
        })
    }

    /// Estimate gas limit and price for calling `recipient` with `payload`.
    ///
    /// A failed or timed-out limit simulation still reports the adjusted price
    /// inside the `Estimation` error.
    pub async fn estimate(
        &self,
        provider: &dyn EvmProvider,
        from: Address,
        recipient: Address,
        payload: &Bytes,
    ) -> CommitterResult<GasEstimate> {
        let gas_price = self.get_gas_price(provider).await?;

        let call: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(recipient)
            .gas_price(gas_price)
            .data(payload.clone())
            .into();

        let simulated = timeout(self.rpc_timeout, provider.estimate_gas(&call))
            .await
            .map_err(|_| CommitterError::Estimation {
                message: format!("gas estimation timed out after {:?}", self.rpc_timeout),
                gas_price: Some(gas_price),
            })?
            .map_err(|e| CommitterError::Estimation {
                message: format!("failed to estimate gas: {}", e),
                gas_price: Some(gas_price),
            })?;

        let gas_limit = self.adjust_gas_limit(simulated);
        debug!(
            "Gas estimate for {:?} -> {:?}: simulated {}, limit {}, price {}",
            from, recipient, simulated, gas_limit, gas_price
        );

        Ok(GasEstimate::new(gas_limit, gas_price))
    }

    /// Get the node's suggested gas price with the adjustment applied
    pub async fn get_gas_price(&self, provider: &dyn EvmProvider) -> CommitterResult<U256> {
        let suggested = timeout(self.rpc_timeout, provider.suggest_gas_price())
            .await
            .map_err(|_| CommitterError::Timeout {
                operation: "gas price suggestion".to_string(),
            })?
            .map_err(|e| CommitterError::Estimation {
                message: format!("failed to suggest gas price: {}", e),
                gas_price: None,
            })?;

        Ok(self.adjust_gas_price(suggested))
    }

    /// `floor(price * gas_price_adjustment)`
    pub fn adjust_gas_price(&self, price: U256) -> U256 {
        if price.bits() <= F64_EXACT_BITS {
            let adjusted = price.low_u64() as f64 * self.gas_price_adjustment;
            return U256::from(adjusted as u128);
        }

        let scaled_factor = (self.gas_price_adjustment * PRICE_SCALE as f64).round() as u128;
        price.saturating_mul(U256::from(scaled_factor)) / U256::from(PRICE_SCALE)
    }

    /// `floor(gas * gas_limit_adjustment)`, saturating at `u64::MAX`
    pub fn adjust_gas_limit(&self, gas: U256) -> u64 {
        let gas = if gas.bits() > 64 { u64::MAX } else { gas.low_u64() };
        (gas as f64 * self.gas_limit_adjustment) as u64
    }
}
