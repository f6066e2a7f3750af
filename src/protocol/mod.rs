//! Wire protocol
//!
//! This module defines the protocol spoken between the three parties of a
//! WebPulse fleet: workers register with the server, clients ask the server
//! for measurements, and the server fans measurement commands out to workers.
//! The protocol uses MessagePack (rmp-serde) for efficient binary
//! serialization with full serde feature support.
//!
//! # Message Flow
//!
//! ```text
//! Worker                  Server                  Client
//!   |---- REGISTER --------->|                       |
//!   |<--- REGISTER_ACK ------|                       |
//!   |                        |<--- MEASURE_WEBSITE --|
//!   |<-- FETCH_AND_MEASURE --|                       |
//!   |---- SAMPLES ---------->|                       |
//!   |                        |---- AGGREGATE ------->|
//!   |                        |<--- GET_WORKERS ------|
//!   |<------- PING ----------|                       |
//!   |-------- PONG --------->|                       |
//!   |                        |---- AGGREGATE ------->|
//! ```
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```

use crate::stats::LatencyStats;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Protocol version
///
/// Increment this when making breaking changes to the protocol.
/// Checked when a worker registers; a mismatch rejects the registration.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum accepted frame size (16MB)
///
/// Sample sets are small; anything larger indicates a corrupt or hostile peer.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// One timed fetch performed by a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// Wall-clock latency of the fetch in milliseconds
    pub latency_ms: u64,

    /// MD5 hex digest of the fetched body (empty when the fetch failed)
    pub digest: String,

    /// Whether the fetch completed successfully
    pub success: bool,
}

/// Ordered per-fetch outcomes reported by one worker for one measurement call
///
/// The worker does not aggregate; min/median/max are computed by the
/// coordinator so the statistics logic lives in one place and is testable
/// without a network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSet {
    /// Address the worker registered under (host:port)
    pub worker: String,

    /// Per-fetch outcomes, in the order they were taken
    pub samples: Vec<Sample>,
}

impl SampleSet {
    /// Latencies of the successful samples, in sample order
    pub fn successful_latencies(&self) -> Vec<u64> {
        self.samples
            .iter()
            .filter(|s| s.success)
            .map(|s| s.latency_ms)
            .collect()
    }

    /// Digest of the first successful sample, if any
    ///
    /// This is the worker's representative digest for the consistency matrix.
    pub fn first_successful_digest(&self) -> Option<&str> {
        self.samples
            .iter()
            .find(|s| s.success)
            .map(|s| s.digest.as_str())
    }

    /// Whether every successful sample carries the same digest
    ///
    /// Disagreement within one worker (content changed mid-measurement) is
    /// reported as a separate signal; it does not invalidate the sample set.
    pub fn digests_agree(&self) -> bool {
        let mut successful = self.samples.iter().filter(|s| s.success);
        match successful.next() {
            Some(first) => successful.all(|s| s.digest == first.digest),
            None => true,
        }
    }
}

/// Response to MeasureWebsite and GetWorkers
///
/// Assembled fresh per request, keyed by worker address so the content is
/// independent of response arrival order. Workers that failed or timed out
/// are absent rather than present-with-nulls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateResponse {
    /// Per-worker latency summary (worker address -> stats)
    pub stats: BTreeMap<String, LatencyStats>,

    /// Pairwise content consistency (worker x worker -> digests matched)
    ///
    /// Present only for MeasureWebsite; GetWorkers fetches no content.
    pub diff: Option<BTreeMap<String, BTreeMap<String, bool>>>,
}

/// Protocol message
///
/// All messages exchanged between workers, server, and clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Registration request (Worker -> Server)
    ///
    /// Sent exactly once at worker startup, before the worker accepts any
    /// measurement commands.
    Register(RegisterMessage),

    /// Registration response (Server -> Worker)
    RegisterAck(RegisterAckMessage),

    /// Measure a website from every worker's vantage point (Client -> Server)
    MeasureWebsite(MeasureWebsiteRequest),

    /// Measure worker-to-server round-trip latency (Client -> Server)
    GetWorkers(GetWorkersRequest),

    /// Aggregated measurement results (Server -> Client)
    Aggregate(AggregateResponse),

    /// Measurement command (Server -> Worker)
    FetchAndMeasure(FetchAndMeasureRequest),

    /// Raw per-fetch outcomes (Worker -> Server)
    Samples(SampleSet),

    /// Latency probe (Server -> Worker)
    Ping,

    /// Latency probe response (Worker -> Server)
    Pong,

    /// Error report (any direction)
    Error(ErrorMessage),
}

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMessage {
    /// Protocol version (must match the server's)
    pub protocol_version: u32,

    /// Externally reachable address of the worker (host:port)
    pub address: String,
}

/// Registration response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAckMessage {
    /// Whether the registration was accepted
    pub accepted: bool,

    /// Rejection reason when not accepted
    pub error: Option<String>,
}

/// Website measurement request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureWebsiteRequest {
    /// URI of the website to measure
    pub uri: String,

    /// Number of samples each worker takes, >= 1
    pub samples_per_worker: u32,
}

/// Worker latency measurement request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetWorkersRequest {
    /// Number of round-trips timed per worker, >= 1
    pub samples_per_worker: u32,
}

/// Measurement command sent to a single worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchAndMeasureRequest {
    /// URI of the website to measure
    pub uri: String,

    /// Number of sequential fetches to perform, >= 1
    pub samples_per_worker: u32,
}

/// Error message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error description
    pub error: String,
}

/// Serialize a message to bytes
///
/// Prepends a 4-byte length field for framing.
///
/// # Message Format
///
/// ```text
/// [4 bytes: message length (little-endian u32)][N bytes: MessagePack message]
/// ```
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>> {
    let msg_bytes = rmp_serde::to_vec(msg).context("Failed to serialize message")?;

    let msg_len = msg_bytes.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Deserialize a message from bytes
///
/// Expects a 4-byte length prefix followed by a MessagePack-serialized message.
///
/// # Returns
///
/// Returns (message, bytes_consumed) where bytes_consumed includes the length prefix.
pub fn deserialize_message(buf: &[u8]) -> Result<(Message, usize)> {
    if buf.len() < 4 {
        anyhow::bail!(
            "Buffer too small for message length (need 4 bytes, got {})",
            buf.len()
        );
    }

    let msg_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

    if buf.len() < 4 + msg_len {
        anyhow::bail!(
            "Incomplete message (need {} bytes, got {})",
            4 + msg_len,
            buf.len()
        );
    }

    let msg = rmp_serde::from_slice(&buf[4..4 + msg_len])
        .context("Failed to deserialize message")?;

    Ok((msg, 4 + msg_len))
}

/// Read a complete message from a TCP stream
///
/// Reads the length prefix, then reads the complete message.
pub async fn read_message(stream: &mut tokio::net::TcpStream) -> Result<Message> {
    use tokio::io::AsyncReadExt;

    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .context("Failed to read message length")?;

    let msg_len = u32::from_le_bytes(len_buf) as usize;

    if msg_len > MAX_MESSAGE_SIZE {
        anyhow::bail!("Message too large: {} bytes (max 16MB)", msg_len);
    }

    let mut msg_buf = vec![0u8; msg_len];
    stream
        .read_exact(&mut msg_buf)
        .await
        .context("Failed to read message body")?;

    let msg = rmp_serde::from_slice(&msg_buf).context("Failed to deserialize message")?;

    Ok(msg)
}

/// Write a message to a TCP stream
///
/// Serializes the message with length prefix and writes to stream.
pub async fn write_message(stream: &mut tokio::net::TcpStream, msg: &Message) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let framed = serialize_message(msg)?;

    stream
        .write_all(&framed)
        .await
        .context("Failed to write message")?;

    // Flush so small request/response frames are not sitting in a buffer
    stream.flush().await.context("Failed to flush stream")?;

    Ok(())
}
