//! Coordinating server
//!
//! Owns the worker registry and serves two independent TCP endpoints:
//! workers register on one, clients request measurements on the other.
//! Each accepted connection gets its own task; a handler failure is logged
//! and closes that connection only.

use crate::config::ServerConfig;
use crate::coordinator::{MeasurementCoordinator, RequestError};
use crate::protocol::{
    read_message, write_message, ErrorMessage, Message, RegisterAckMessage, PROTOCOL_VERSION,
};
use crate::registry::WorkerRegistry;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// The coordinating server process
pub struct Server {
    config: ServerConfig,
    registry: Arc<WorkerRegistry>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(WorkerRegistry::new()),
        }
    }

    /// Run both endpoints until the process is stopped
    pub async fn run(self) -> Result<()> {
        let worker_listener = TcpListener::bind(&self.config.worker_listen)
            .await
            .with_context(|| format!("Failed to bind worker endpoint {}", self.config.worker_listen))?;
        let client_listener = TcpListener::bind(&self.config.client_listen)
            .await
            .with_context(|| format!("Failed to bind client endpoint {}", self.config.client_listen))?;

        println!("Worker endpoint listening on {}", self.config.worker_listen);
        println!("Client endpoint listening on {}", self.config.client_listen);

        let coordinator = Arc::new(MeasurementCoordinator::new(
            self.registry.clone(),
            Duration::from_secs(self.config.call_timeout_secs),
        ));

        let registry = self.registry.clone();
        let workers = tokio::spawn(accept_workers(worker_listener, registry));
        let clients = tokio::spawn(accept_clients(client_listener, coordinator));

        // Both loops run forever; an Err here means a listener died
        let (workers, clients) = tokio::try_join!(workers, clients)
            .context("Server accept loop panicked")?;
        workers?;
        clients?;

        Ok(())
    }
}

/// Accept loop for the worker-facing endpoint
async fn accept_workers(listener: TcpListener, registry: Arc<WorkerRegistry>) -> Result<()> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("Failed to accept worker connection")?;

        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_worker_conn(stream, registry).await {
                log::warn!("Worker connection from {} failed: {:#}", peer, e);
            }
        });
    }
}

/// Accept loop for the client-facing endpoint
async fn accept_clients(
    listener: TcpListener,
    coordinator: Arc<MeasurementCoordinator>,
) -> Result<()> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("Failed to accept client connection")?;

        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client_conn(stream, coordinator).await {
                log::warn!("Client connection from {} failed: {:#}", peer, e);
            }
        });
    }
}

/// Handle one worker connection (registrations)
async fn handle_worker_conn(mut stream: TcpStream, registry: Arc<WorkerRegistry>) -> Result<()> {
    loop {
        let msg = match read_message(&mut stream).await {
            Ok(msg) => msg,
            // Worker closed the connection after registering
            Err(_) => return Ok(()),
        };

        match msg {
            Message::Register(register) => {
                let ack = if register.protocol_version != PROTOCOL_VERSION {
                    RegisterAckMessage {
                        accepted: false,
                        error: Some(format!(
                            "Protocol version mismatch: worker={}, server={}",
                            register.protocol_version, PROTOCOL_VERSION
                        )),
                    }
                } else {
                    match registry.register(&register.address) {
                        Ok(newly_added) => {
                            if newly_added {
                                log::info!("Registered worker {}", register.address);
                            } else {
                                log::info!(
                                    "Worker {} re-registered (already known)",
                                    register.address
                                );
                            }
                            RegisterAckMessage {
                                accepted: true,
                                error: None,
                            }
                        }
                        Err(e) => {
                            log::warn!("Rejected worker registration: {:#}", e);
                            RegisterAckMessage {
                                accepted: false,
                                error: Some(format!("{:#}", e)),
                            }
                        }
                    }
                };

                write_message(&mut stream, &Message::RegisterAck(ack)).await?;
            }
            other => {
                let error = ErrorMessage {
                    error: format!("Unexpected message on worker endpoint: {:?}", other),
                };
                write_message(&mut stream, &Message::Error(error)).await?;
                return Ok(());
            }
        }
    }
}

/// Handle one client connection (measurement requests)
async fn handle_client_conn(
    mut stream: TcpStream,
    coordinator: Arc<MeasurementCoordinator>,
) -> Result<()> {
    loop {
        let msg = match read_message(&mut stream).await {
            Ok(msg) => msg,
            Err(_) => return Ok(()),
        };

        let result = match msg {
            Message::MeasureWebsite(req) => {
                coordinator
                    .measure_website(&req.uri, req.samples_per_worker)
                    .await
            }
            Message::GetWorkers(req) => coordinator.probe_workers(req.samples_per_worker).await,
            other => {
                let error = ErrorMessage {
                    error: format!("Unexpected message on client endpoint: {:?}", other),
                };
                write_message(&mut stream, &Message::Error(error)).await?;
                return Ok(());
            }
        };

        match result {
            Ok(response) => {
                write_message(&mut stream, &Message::Aggregate(response)).await?;
            }
            Err(e) if e.downcast_ref::<RequestError>().is_some() => {
                // Malformed request: explicit rejection, connection stays up
                write_message(
                    &mut stream,
                    &Message::Error(ErrorMessage {
                        error: format!("{}", e),
                    }),
                )
                .await?;
            }
            Err(e) => {
                log::error!("Measurement round failed: {:#}", e);
                write_message(
                    &mut stream,
                    &Message::Error(ErrorMessage {
                        error: format!("Internal error: {:#}", e),
                    }),
                )
                .await?;
            }
        }
    }
}
