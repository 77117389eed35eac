//! Transaction committer - submits payloads read from stdin
//!
//! Each input line is a JSON request `{"to": "0x..", "data": "0x.."}` with
//! optional `gas_limit` and `gas_price` (decimal wei) overrides. Requests are
//! processed concurrently; nonces stay gap-free through the committer.

use anyhow::{Context, Result};
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use evm_tx_committer::config::Settings;
use evm_tx_committer::metrics::MetricsServer;
use evm_tx_committer::{
    ChainProvider, EthCommitter, EvmCommitter, GasEstimate, NonceCache, TxSigner, WalletSigner,
};

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    to: Address,
    data: Bytes,
    gas_limit: Option<u64>,
    gas_price: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitResult {
    to: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_hash: Option<H256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting transaction committer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for chain {} ({} RPC endpoints)",
        settings.chain.name,
        settings.chain.rpc_urls.len()
    );

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let provider = Arc::new(ChainProvider::new(settings.chain.clone())?);
    let signer = WalletSigner::from_env(&settings.wallet.private_key_env, provider.chain_id())?;
    let from = signer.address();

    let committer = Arc::new(
        EthCommitter::new(
            from,
            settings.committer.gas_price_adjustment,
            settings.committer.gas_limit_adjustment,
            Arc::new(signer),
            provider,
            Arc::new(NonceCache::new()),
            settings.committer.to_options()?,
        )
        .await
        .context("Failed to initialize committer")?,
    );
    info!("Committer ready for {:?}", from);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<SubmitRequest>(&line) {
                    Ok(request) => {
                        tasks.spawn(process(committer.clone(), request));
                    }
                    Err(e) => warn!("Skipping malformed request: {}", e),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received, waiting for in-flight submissions");
                break;
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Submission task failed: {}", e);
        }
    }

    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Transaction committer stopped");
    Ok(())
}

async fn process(committer: Arc<EthCommitter>, request: SubmitRequest) {
    let to = request.to;
    let result = match resolve_gas(committer.as_ref(), &request).await {
        Ok(gas) => {
            debug!(
                "Submitting to {:?} with gas limit {} at {} wei (max fee {} wei)",
                to,
                gas.gas_limit,
                gas.gas_price,
                gas.cost()
            );
            committer
                .send_tx(to, request.data, gas.gas_limit, gas.gas_price)
                .await
                .map_err(anyhow::Error::from)
        }
        Err(e) => Err(e),
    };

    let output = match result {
        Ok(tx_hash) => SubmitResult {
            to,
            tx_hash: Some(tx_hash),
            error: None,
        },
        Err(e) => SubmitResult {
            to,
            tx_hash: None,
            error: Some(format!("{:#}", e)),
        },
    };

    match serde_json::to_string(&output) {
        Ok(line) => println!("{}", line),
        Err(e) => error!("Failed to encode result for {:?}: {}", to, e),
    }
}

/// Gas for a request: explicit overrides win, then the estimate, then the fallback
async fn resolve_gas(committer: &EthCommitter, request: &SubmitRequest) -> Result<GasEstimate> {
    let gas_price = request
        .gas_price
        .as_deref()
        .map(U256::from_dec_str)
        .transpose()
        .map_err(|e| anyhow::anyhow!("Invalid gas price {:?}: {}", request.gas_price, e))?;

    let mut gas = match (request.gas_limit, gas_price) {
        (Some(gas_limit), Some(gas_price)) => return Ok(GasEstimate::new(gas_limit, gas_price)),
        _ => match committer.estimate_gas(request.to, &request.data).await {
            Ok(estimate) => estimate,
            Err(e) => {
                warn!(
                    "Gas estimation for {:?} failed, using fallback: {}",
                    request.to, e
                );
                committer.fallback_gas()
            }
        },
    };

    if let Some(gas_limit) = request.gas_limit {
        gas.gas_limit = gas_limit;
    }
    if let Some(gas_price) = gas_price {
        gas.gas_price = gas_price;
    }

    Ok(gas)
}

/// Logs go to stderr so stdout carries only result lines.
/// `COMMITTER_LOG_FORMAT=json` switches to structured JSON output.
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,evm_tx_committer=debug,hyper=warn"));

    let json = std::env::var("COMMITTER_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
