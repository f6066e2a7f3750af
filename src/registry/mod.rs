//! Worker registry
//!
//! Server-side table of known worker addresses. The table is the only shared
//! mutable state in the server; a mutex serializes concurrent registrations
//! against the read-snapshots the coordinator takes when fanning out.
//!
//! Registration is idempotent: the same address registered twice (a worker
//! reconnecting after a restart) is recorded once, so fan-out issues exactly
//! one call per distinct address. Workers are never evicted; the registry
//! lives as long as the server process (no persistence).

use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Mutex;

/// Process-wide table of registered worker addresses
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: Mutex<BTreeSet<String>>,
}

impl WorkerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker address
    ///
    /// Returns `true` if the address was newly added, `false` if it was
    /// already registered. A malformed address is an error reported to the
    /// caller; the registry itself is unaffected.
    pub fn register(&self, address: &str) -> Result<bool> {
        validate_address(address)?;

        let mut workers = self.workers.lock().unwrap();
        Ok(workers.insert(address.to_string()))
    }

    /// Snapshot of all registered addresses, sorted
    ///
    /// Safe to iterate while registrations keep arriving; the snapshot is
    /// detached from the live table.
    pub fn list_all(&self) -> Vec<String> {
        let workers = self.workers.lock().unwrap();
        workers.iter().cloned().collect()
    }

    /// Number of registered workers
    pub fn len(&self) -> usize {
        self.workers.lock().unwrap().len()
    }

    /// Whether no workers are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validate a worker address of the form host:port
///
/// The host may be an IP address or a hostname; the port must be a non-zero
/// u16. No DNS resolution is attempted here.
pub fn validate_address(address: &str) -> Result<()> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("Address '{}' is not in host:port form", address))?;

    if host.is_empty() || host.contains(char::is_whitespace) {
        anyhow::bail!("Address '{}' has an invalid host part", address);
    }

    let port: u16 = port
        .parse()
        .map_err(|_| anyhow::anyhow!("Address '{}' has an invalid port", address))?;

    if port == 0 {
        anyhow::bail!("Address '{}' has port 0", address);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_register_and_list() {
        let registry = WorkerRegistry::new();

        assert!(registry.register("10.0.1.10:7080").unwrap());
        assert!(registry.register("10.0.1.11:7080").unwrap());

        assert_eq!(
            registry.list_all(),
            vec!["10.0.1.10:7080".to_string(), "10.0.1.11:7080".to_string()]
        );
    }

    #[test]
    fn test_duplicate_registration_is_idempotent() {
        let registry = WorkerRegistry::new();

        assert!(registry.register("10.0.1.10:7080").unwrap());
        assert!(!registry.register("10.0.1.10:7080").unwrap());

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_malformed_addresses_rejected() {
        let registry = WorkerRegistry::new();

        assert!(registry.register("no-port").is_err());
        assert!(registry.register(":7080").is_err());
        assert!(registry.register("host:notaport").is_err());
        assert!(registry.register("host:0").is_err());
        assert!(registry.register("host:99999").is_err());

        // Failed registrations leave the registry untouched
        assert!(registry.is_empty());
    }

    #[test]
    fn test_hostnames_accepted() {
        let registry = WorkerRegistry::new();
        assert!(registry.register("worker-eu.example.com:7080").unwrap());
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(WorkerRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        registry
                            .register(&format!("10.0.{}.{}:7080", i, j))
                            .unwrap();
                        // Snapshots must stay readable mid-registration
                        let _ = registry.list_all();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 8 * 50);
    }
}
