//! CLI argument parsing using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Run the coordinating server (worker registry + measurement fan-out)
    Server,
    /// Run a measurement worker agent
    Worker,
    /// Client: measure a website from every worker's vantage point
    Measure,
    /// Client: measure worker-to-server round-trip latency
    Workers,
}

/// WebPulse - distributed website latency and consistency measurement
#[derive(Parser, Debug)]
#[command(name = "webpulse")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: server, worker, measure, or workers
    #[arg(long, value_enum)]
    pub mode: Mode,

    /// TOML configuration file (CLI flags override file values)
    #[arg(long)]
    pub config: Option<PathBuf>,

    // === Server options ===
    /// Address the server listens on for worker registrations (ip:port)
    #[arg(long)]
    pub worker_listen: Option<String>,

    /// Address the server listens on for client requests (ip:port)
    #[arg(long)]
    pub client_listen: Option<String>,

    /// Per-worker measurement call timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    // === Worker / client options ===
    /// Server address to connect to (worker mode: the worker-facing
    /// endpoint; measure/workers modes: the client-facing endpoint)
    #[arg(long)]
    pub server: Option<String>,

    /// Port this worker listens on for server commands (worker mode)
    #[arg(long)]
    pub listen_port: Option<u16>,

    /// Externally reachable address to register instead of discovering the
    /// public IP (worker mode, host:port)
    #[arg(long)]
    pub advertise: Option<String>,

    // === Client options ===
    /// URI of the website to measure (measure mode)
    #[arg(long)]
    pub uri: Option<String>,

    /// Number of samples each worker takes
    #[arg(long)]
    pub samples: Option<u32>,

    /// Emit JSON instead of the text report
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
