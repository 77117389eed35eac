//! Configuration management for the transaction committer binary
//!
//! Loads configuration from TOML files with environment variable substitution.
//! The committer itself is configured programmatically through
//! [`CommitterOptions`]; this module only maps a settings file onto it.

use crate::error::CommitterResult;
use crate::tx::CommitterOptions;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub committer: CommitterConfig,
    pub chain: ChainConfig,
    pub wallet: WalletConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitterConfig {
    pub gas_price_adjustment: f64,
    pub gas_limit_adjustment: f64,
    /// Fallback gas price in wei, as a decimal string
    pub gas_price: Option<String>,
    pub gas_limit: Option<u64>,
    pub rpc_timeout_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key_env: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl CommitterConfig {
    /// Build committer options, starting from the defaults
    pub fn to_options(&self) -> CommitterResult<CommitterOptions> {
        let mut options = CommitterOptions::default();

        if let Some(ref gas_price) = self.gas_price {
            options = options.with_gas_price_str(gas_price)?;
        }
        if let Some(gas_limit) = self.gas_limit {
            options = options.with_gas_limit(gas_limit);
        }
        if let Some(timeout_ms) = self.rpc_timeout_ms {
            options = options.with_rpc_timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(max_attempts) = self.max_attempts {
            options = options.with_max_attempts(max_attempts);
        }

        options.validate()?;
        Ok(options)
    }
}

impl Settings {
    /// Load settings from the file named by `COMMITTER_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("COMMITTER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str)?;

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chain.rpc_urls.is_empty() {
            anyhow::bail!("Chain {} has no RPC URLs configured", self.chain.name);
        }

        for (name, factor) in [
            ("gas_price_adjustment", self.committer.gas_price_adjustment),
            ("gas_limit_adjustment", self.committer.gas_limit_adjustment),
        ] {
            if !factor.is_finite() || factor <= 0.0 {
                anyhow::bail!("{} must be a positive number, got {}", name, factor);
            }
        }

        if self.wallet.private_key_env.is_empty() {
            anyhow::bail!("wallet.private_key_env must name an environment variable");
        }

        if self.committer.gas_price_adjustment < 1.0 {
            tracing::warn!(
                "gas_price_adjustment {} is below 1.0 - transactions may be underpriced",
                self.committer.gas_price_adjustment
            );
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")?;

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    Ok(result)
}
