//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Accepted and failed submissions per sending account
//! - Nonce resyncs and known-transaction skips
//! - Submission latency

use axum::{http::StatusCode, routing::get, Router};
use ethers::types::Address;
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "committer_transactions_submitted_total",
        "Total transactions accepted by the node",
        &["account"]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "committer_transactions_failed_total",
        "Total send_tx calls that ended in an error, by error kind",
        &["account", "kind"]
    ).unwrap();

    pub static ref NONCE_RESYNCS: CounterVec = register_counter_vec!(
        "committer_nonce_resyncs_total",
        "Total nonce resynchronizations triggered by nonce drift",
        &["account"]
    ).unwrap();

    pub static ref NONCE_SKIPS: CounterVec = register_counter_vec!(
        "committer_nonce_skips_total",
        "Total nonces skipped after a known-transaction response",
        &["account"]
    ).unwrap();

    pub static ref SEND_LATENCY: HistogramVec = register_histogram_vec!(
        "committer_send_latency_seconds",
        "Time spent in send_tx, including waiting for the account lock",
        &["account"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> std::io::Result<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// Helper functions to record metrics

fn account_label(account: Address) -> String {
    format!("{:?}", account)
}

pub fn record_tx_submitted(account: Address) {
    TX_SUBMITTED
        .with_label_values(&[&account_label(account)])
        .inc();
}

pub fn record_tx_failed(account: Address, kind: &str) {
    TX_FAILED
        .with_label_values(&[&account_label(account), kind])
        .inc();
}

pub fn record_nonce_resync(account: Address) {
    NONCE_RESYNCS
        .with_label_values(&[&account_label(account)])
        .inc();
}

pub fn record_nonce_skip(account: Address) {
    NONCE_SKIPS
        .with_label_values(&[&account_label(account)])
        .inc();
}

pub fn record_send_latency(account: Address, latency_secs: f64) {
    SEND_LATENCY
        .with_label_values(&[&account_label(account)])
        .observe(latency_secs);
}
