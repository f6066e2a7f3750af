//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! CLI flags win over config-file values; built-in defaults fill the rest.

pub mod cli;
pub mod toml;
pub mod validator;

use serde::{Deserialize, Serialize};

/// Default port the server listens on for workers
pub const DEFAULT_WORKER_LISTEN: &str = "0.0.0.0:7070";

/// Default port the server listens on for clients
pub const DEFAULT_CLIENT_LISTEN: &str = "0.0.0.0:7071";

/// Default port a worker listens on for server commands
pub const DEFAULT_WORKER_PORT: u16 = 7080;

/// Default per-worker call timeout in seconds
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;

/// Server (coordinator) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address workers connect to for registration (ip:port)
    pub worker_listen: String,

    /// Address clients connect to for measurement requests (ip:port)
    pub client_listen: String,

    /// Per-worker measurement call timeout in seconds
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

/// Worker agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// The server's worker-facing address (host:port)
    pub server: String,

    /// Port this worker listens on for server commands
    #[serde(default = "default_worker_port")]
    pub listen_port: u16,

    /// Externally reachable address to register (host:port)
    ///
    /// When absent the worker discovers its public IP and combines it with
    /// `listen_port`. Set this explicitly on LANs and in tests.
    pub advertise: Option<String>,
}

/// Client configuration (measure / workers modes)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The server's client-facing address (host:port)
    pub server: String,

    /// Number of samples each worker takes
    pub samples: u32,

    /// Emit machine-readable JSON instead of the text report
    #[serde(default)]
    pub json: bool,
}

fn default_call_timeout_secs() -> u64 {
    DEFAULT_CALL_TIMEOUT_SECS
}

fn default_worker_port() -> u16 {
    DEFAULT_WORKER_PORT
}
