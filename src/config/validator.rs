//! Configuration validation

use super::{ClientConfig, ServerConfig, WorkerConfig};
use crate::registry;
use anyhow::{Context, Result};
use std::net::SocketAddr;

/// Validate server configuration
pub fn validate_server(config: &ServerConfig) -> Result<()> {
    validate_listen_addr(&config.worker_listen)
        .context("Invalid worker-facing listen address")?;
    validate_listen_addr(&config.client_listen)
        .context("Invalid client-facing listen address")?;

    if config.worker_listen == config.client_listen {
        anyhow::bail!(
            "Worker and client endpoints must differ, both are {}",
            config.worker_listen
        );
    }

    if config.call_timeout_secs == 0 {
        anyhow::bail!("call_timeout_secs must be >= 1");
    }

    Ok(())
}

/// Validate worker configuration
pub fn validate_worker(config: &WorkerConfig) -> Result<()> {
    registry::validate_address(&config.server).context("Invalid server address")?;

    if config.listen_port == 0 {
        anyhow::bail!("listen_port must be non-zero");
    }

    if let Some(ref advertise) = config.advertise {
        registry::validate_address(advertise).context("Invalid advertise address")?;
    }

    Ok(())
}

/// Validate client configuration
pub fn validate_client(config: &ClientConfig) -> Result<()> {
    registry::validate_address(&config.server).context("Invalid server address")?;

    if config.samples == 0 {
        anyhow::bail!("samples must be >= 1");
    }

    Ok(())
}

/// Validate a listen address
///
/// Listen addresses must be literal ip:port (no hostnames to resolve).
fn validate_listen_addr(addr: &str) -> Result<()> {
    addr.parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| anyhow::anyhow!("'{}' is not a valid ip:port listen address", addr))
}
