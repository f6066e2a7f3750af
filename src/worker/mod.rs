//! Worker agent
//!
//! Runs on each measurement vantage point. At startup the agent registers
//! its externally reachable address with the server exactly once; if
//! registration fails it aborts startup (an unregistered worker is invisible
//! to the fleet and therefore useless). After that it serves measurement
//! commands: timed sequential fetches of a URI with content digests, and
//! Ping/Pong latency probes.

use crate::config::WorkerConfig;
use crate::fetch::{discover_public_ip, Fetcher};
use crate::protocol::{
    read_message, write_message, ErrorMessage, Message, RegisterMessage, Sample, SampleSet,
    PROTOCOL_VERSION,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};

/// A measurement worker
pub struct WorkerAgent<F: Fetcher> {
    config: WorkerConfig,
    fetcher: Arc<F>,
}

impl<F: Fetcher> WorkerAgent<F> {
    pub fn new(config: WorkerConfig, fetcher: F) -> Self {
        Self {
            config,
            fetcher: Arc::new(fetcher),
        }
    }

    /// Register with the server, then serve measurement commands forever
    pub async fn run(self) -> Result<()> {
        // Bind before registering so the server can probe immediately
        let listener = TcpListener::bind(("0.0.0.0", self.config.listen_port))
            .await
            .with_context(|| format!("Failed to bind worker port {}", self.config.listen_port))?;

        let advertise = match self.config.advertise.clone() {
            Some(advertise) => advertise,
            None => {
                let ip = discover_public_ip()
                    .await
                    .context("Failed to discover public IP (use --advertise to set one)")?;
                format!("{}:{}", ip, self.config.listen_port)
            }
        };

        // Fail fast: without a successful registration there is no point serving
        register_with_server(&self.config.server, &advertise)
            .await
            .context("Registration with server failed, aborting startup")?;

        println!("Registered with {} as {}", self.config.server, advertise);
        println!("Listening for measurement commands on port {}", self.config.listen_port);

        serve(listener, Arc::new(advertise), self.fetcher).await
    }
}

/// Register the worker's advertise address with the server
///
/// Sends REGISTER and requires an accepting REGISTER_ACK; any transport
/// failure or rejection is an error for the caller to abort on.
pub async fn register_with_server(server: &str, advertise: &str) -> Result<()> {
    let mut stream = TcpStream::connect(server)
        .await
        .with_context(|| format!("Failed to connect to server {}", server))?;

    let register = RegisterMessage {
        protocol_version: PROTOCOL_VERSION,
        address: advertise.to_string(),
    };
    write_message(&mut stream, &Message::Register(register))
        .await
        .context("Failed to send REGISTER")?;

    match read_message(&mut stream).await.context("Failed to read REGISTER_ACK")? {
        Message::RegisterAck(ack) if ack.accepted => Ok(()),
        Message::RegisterAck(ack) => anyhow::bail!(
            "Server rejected registration: {}",
            ack.error.unwrap_or_else(|| "no reason given".to_string())
        ),
        other => anyhow::bail!("Expected REGISTER_ACK, got {:?}", other),
    }
}

/// Accept server connections and handle measurement commands
pub async fn serve<F: Fetcher>(
    listener: TcpListener,
    advertise: Arc<String>,
    fetcher: Arc<F>,
) -> Result<()> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("Failed to accept server connection")?;

        let advertise = advertise.clone();
        let fetcher = fetcher.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_conn(stream, advertise, fetcher).await {
                log::warn!("Connection from {} failed: {:#}", peer, e);
            }
        });
    }
}

/// Handle one server connection
async fn handle_conn<F: Fetcher>(
    mut stream: TcpStream,
    advertise: Arc<String>,
    fetcher: Arc<F>,
) -> Result<()> {
    loop {
        let msg = match read_message(&mut stream).await {
            Ok(msg) => msg,
            // Server closed the connection; measurement calls are one-shot
            Err(_) => return Ok(()),
        };

        match msg {
            Message::FetchAndMeasure(req) => {
                if req.samples_per_worker == 0 {
                    write_message(
                        &mut stream,
                        &Message::Error(ErrorMessage {
                            error: "samples_per_worker must be >= 1".to_string(),
                        }),
                    )
                    .await?;
                    continue;
                }

                log::info!(
                    "Measuring {} ({} samples)",
                    req.uri,
                    req.samples_per_worker
                );

                let samples =
                    collect_samples(fetcher.as_ref(), &req.uri, req.samples_per_worker).await;
                let set = SampleSet {
                    worker: advertise.as_ref().clone(),
                    samples,
                };
                write_message(&mut stream, &Message::Samples(set)).await?;
            }
            Message::Ping => {
                write_message(&mut stream, &Message::Pong).await?;
            }
            other => {
                write_message(
                    &mut stream,
                    &Message::Error(ErrorMessage {
                        error: format!("Unexpected message: {:?}", other),
                    }),
                )
                .await?;
                return Ok(());
            }
        }
    }
}

/// Perform `count` sequential timed fetches of `uri`
///
/// Fetches are sequential on purpose: concurrent fetches from one worker
/// would contend with each other and skew the latencies. A failed fetch is
/// recorded with `success: false` and the loop continues; the coordinator
/// decides what to do with partial failures.
pub async fn collect_samples<F: Fetcher>(fetcher: &F, uri: &str, count: u32) -> Vec<Sample> {
    let mut samples = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let start = Instant::now();
        match fetcher.fetch(uri).await {
            Ok(body) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                samples.push(Sample {
                    latency_ms,
                    digest: format!("{:x}", md5::compute(&body)),
                    success: true,
                });
            }
            Err(e) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                log::debug!("Fetch of {} failed: {:#}", uri, e);
                samples.push(Sample {
                    latency_ms,
                    digest: String::new(),
                    success: false,
                });
            }
        }
    }

    samples
}
