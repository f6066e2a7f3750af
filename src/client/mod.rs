//! Measurement client
//!
//! Thin one-shot RPC client for the server's client-facing endpoint. Retry
//! on failure is left to the caller; the server never retries on a client's
//! behalf.

use crate::protocol::{
    read_message, write_message, AggregateResponse, GetWorkersRequest, MeasureWebsiteRequest,
    Message,
};
use anyhow::{Context, Result};
use tokio::net::TcpStream;

/// Ask the server to measure a website from every worker
pub async fn measure_website(
    server: &str,
    uri: &str,
    samples_per_worker: u32,
) -> Result<AggregateResponse> {
    let request = Message::MeasureWebsite(MeasureWebsiteRequest {
        uri: uri.to_string(),
        samples_per_worker,
    });
    round_trip(server, &request).await
}

/// Ask the server for worker-to-server round-trip latencies
pub async fn get_workers(server: &str, samples_per_worker: u32) -> Result<AggregateResponse> {
    let request = Message::GetWorkers(GetWorkersRequest { samples_per_worker });
    round_trip(server, &request).await
}

async fn round_trip(server: &str, request: &Message) -> Result<AggregateResponse> {
    let mut stream = TcpStream::connect(server)
        .await
        .with_context(|| format!("Failed to connect to server {}", server))?;

    write_message(&mut stream, request)
        .await
        .context("Failed to send request")?;

    match read_message(&mut stream).await.context("Failed to read response")? {
        Message::Aggregate(response) => Ok(response),
        Message::Error(err) => anyhow::bail!("Server rejected request: {}", err.error),
        other => anyhow::bail!("Expected AGGREGATE, got {:?}", other),
    }
}
