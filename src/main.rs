//! WebPulse CLI entry point

use anyhow::{Context, Result};
use webpulse::config::cli::{Cli, Mode};
use webpulse::config::toml::FileConfig;
use webpulse::config::{
    validator, ClientConfig, ServerConfig, WorkerConfig, DEFAULT_CALL_TIMEOUT_SECS,
    DEFAULT_CLIENT_LISTEN, DEFAULT_WORKER_LISTEN, DEFAULT_WORKER_PORT,
};
use webpulse::fetch::HttpFetcher;
use webpulse::server::Server;
use webpulse::worker::WorkerAgent;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse_args();

    let file = match cli.config {
        Some(ref path) => webpulse::config::toml::load_config(path)?,
        None => FileConfig::default(),
    };

    match cli.mode {
        Mode::Server => run_server(cli, file),
        Mode::Worker => run_worker(cli, file),
        Mode::Measure => run_measure(cli, file),
        Mode::Workers => run_get_workers(cli, file),
    }
}

/// Run the coordinating server
fn run_server(cli: Cli, file: FileConfig) -> Result<()> {
    let config = ServerConfig {
        worker_listen: cli
            .worker_listen
            .or(file.server.worker_listen)
            .unwrap_or_else(|| DEFAULT_WORKER_LISTEN.to_string()),
        client_listen: cli
            .client_listen
            .or(file.server.client_listen)
            .unwrap_or_else(|| DEFAULT_CLIENT_LISTEN.to_string()),
        call_timeout_secs: cli
            .timeout
            .or(file.server.call_timeout_secs)
            .unwrap_or(DEFAULT_CALL_TIMEOUT_SECS),
    };

    validator::validate_server(&config).context("Configuration validation failed")?;

    println!("WebPulse server v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(Server::new(config).run())
}

/// Run a worker agent
fn run_worker(cli: Cli, file: FileConfig) -> Result<()> {
    let config = WorkerConfig {
        server: cli
            .server
            .or(file.worker.server)
            .context("--server is required in worker mode")?,
        listen_port: cli
            .listen_port
            .or(file.worker.listen_port)
            .unwrap_or(DEFAULT_WORKER_PORT),
        advertise: cli.advertise.or(file.worker.advertise),
    };

    validator::validate_worker(&config).context("Configuration validation failed")?;

    println!("WebPulse worker v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(WorkerAgent::new(config, HttpFetcher::new()).run())
}

/// Measure a website from every worker's vantage point
fn run_measure(cli: Cli, file: FileConfig) -> Result<()> {
    let uri = cli.uri.clone().context("--uri is required in measure mode")?;
    let config = client_config(cli, file)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let response = runtime.block_on(webpulse::client::measure_website(
        &config.server,
        &uri,
        config.samples,
    ))?;

    if config.json {
        webpulse::output::print_json(&response)
    } else {
        webpulse::output::print_results(&response);
        Ok(())
    }
}

/// Measure worker-to-server round-trip latency
fn run_get_workers(cli: Cli, file: FileConfig) -> Result<()> {
    let config = client_config(cli, file)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let response =
        runtime.block_on(webpulse::client::get_workers(&config.server, config.samples))?;

    if config.json {
        webpulse::output::print_json(&response)
    } else {
        webpulse::output::print_results(&response);
        Ok(())
    }
}

/// Build and validate client configuration from CLI and file values
fn client_config(cli: Cli, file: FileConfig) -> Result<ClientConfig> {
    let config = ClientConfig {
        server: cli
            .server
            .or(file.client.server)
            .context("--server is required in client modes")?,
        samples: cli.samples.or(file.client.samples).unwrap_or(3),
        json: cli.json,
    };

    validator::validate_client(&config).context("Configuration validation failed")?;

    Ok(config)
}
