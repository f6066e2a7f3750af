//! TOML configuration file support
//!
//! A config file carries per-mode sections; every field is optional and is
//! only consulted when the matching CLI flag was not given.
//!
//! ```toml
//! [server]
//! worker_listen = "0.0.0.0:7070"
//! client_listen = "0.0.0.0:7071"
//! call_timeout_secs = 10
//!
//! [worker]
//! server = "coordinator.example.com:7070"
//! listen_port = 7080
//!
//! [client]
//! server = "coordinator.example.com:7071"
//! samples = 5
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Parsed configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub worker: WorkerSection,

    #[serde(default)]
    pub client: ClientSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSection {
    pub worker_listen: Option<String>,
    pub client_listen: Option<String>,
    pub call_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkerSection {
    pub server: Option<String>,
    pub listen_port: Option<u16>,
    pub advertise: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientSection {
    pub server: Option<String>,
    pub samples: Option<u32>,
}

/// Load a configuration file
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: FileConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: FileConfig = toml::from_str(
            r#"
            [server]
            worker_listen = "0.0.0.0:7070"
            client_listen = "0.0.0.0:7071"
            call_timeout_secs = 5

            [worker]
            server = "198.51.100.1:7070"
            listen_port = 7080
            advertise = "203.0.113.7:7080"

            [client]
            server = "198.51.100.1:7071"
            samples = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.server.worker_listen.as_deref(), Some("0.0.0.0:7070"));
        assert_eq!(config.server.call_timeout_secs, Some(5));
        assert_eq!(config.worker.listen_port, Some(7080));
        assert_eq!(config.client.samples, Some(5));
    }

    #[test]
    fn test_sections_are_optional() {
        let config: FileConfig = toml::from_str("[worker]\nserver = \"h:1\"\n").unwrap();
        assert!(config.server.worker_listen.is_none());
        assert_eq!(config.worker.server.as_deref(), Some("h:1"));
    }

    #[test]
    fn test_empty_file() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.client.server.is_none());
    }
}
