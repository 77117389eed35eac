//! Committer options with sensible defaults

use crate::error::{CommitterError, CommitterResult};

use ethers::types::U256;
use std::time::Duration;

/// 20 gwei
const DEFAULT_GAS_PRICE: u64 = 20_000_000_000;
const DEFAULT_GAS_LIMIT: u64 = 1_000_000;
const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_ATTEMPTS: u32 = 64;

/// Immutable committer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CommitterOptions {
    /// Fallback gas price for callers that skip estimation
    pub gas_price: U256,
    /// Fallback gas limit for callers that skip estimation
    pub gas_limit: u64,
    /// Deadline applied to every individual node call
    pub rpc_timeout: Duration,
    /// Upper bound on build/broadcast iterations within one `send_tx`
    pub max_attempts: u32,
}

impl Default for CommitterOptions {
    fn default() -> Self {
        Self {
            gas_price: U256::from(DEFAULT_GAS_PRICE),
            gas_limit: DEFAULT_GAS_LIMIT,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl CommitterOptions {
    pub fn with_gas_price(mut self, gas_price: U256) -> Self {
        self.gas_price = gas_price;
        self
    }

    /// Set the fallback gas price from a decimal wei amount
    pub fn with_gas_price_str(mut self, gas_price: &str) -> CommitterResult<Self> {
        self.gas_price = U256::from_dec_str(gas_price.trim()).map_err(|e| {
            CommitterError::Config(format!("Invalid gas price {:?}: {}", gas_price, e))
        })?;
        Ok(self)
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Validate options
    pub fn validate(&self) -> CommitterResult<()> {
        if self.rpc_timeout.is_zero() {
            return Err(CommitterError::Config(
                "RPC timeout must be greater than zero".to_string(),
            ));
        }
        if self.gas_limit == 0 {
            return Err(CommitterError::Config(
                "Fallback gas limit must be greater than zero".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(CommitterError::Config(
                "At least one send attempt must be allowed".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = CommitterOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.gas_price, U256::from(20_000_000_000u64));
        assert_eq!(options.rpc_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_gas_price_from_decimal_string() {
        let options = CommitterOptions::default()
            .with_gas_price_str(" 1500000000 ")
            .unwrap();
        assert_eq!(options.gas_price, U256::from(1_500_000_000u64));

        assert!(CommitterOptions::default().with_gas_price_str("1.5 gwei").is_err());
    }

    #[test]
    fn test_zero_values_rejected() {
        let zero_timeout = CommitterOptions::default().with_rpc_timeout(Duration::ZERO);
        assert!(zero_timeout.validate().is_err());

        let zero_limit = CommitterOptions::default().with_gas_limit(0);
        assert!(zero_limit.validate().is_err());

        let zero_attempts = CommitterOptions::default().with_max_attempts(0);
        assert!(zero_attempts.validate().is_err());
    }
}
