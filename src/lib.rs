//! WebPulse - distributed website latency and consistency measurement
//!
//! WebPulse coordinates a fleet of geographically distributed workers to
//! answer two questions on demand: what latency and content does each worker
//! observe when fetching a URI, and what is each worker's baseline latency
//! to the coordinating server.
//!
//! # Architecture
//!
//! - **Server**: holds the worker registry, fans measurement requests out to
//!   the fleet, aggregates per-worker results into summary statistics and a
//!   pairwise content-consistency diff
//! - **Workers**: register at startup, then perform timed sequential fetches
//!   with content digests on command
//! - **Clients**: one-shot requests against the server's client endpoint

pub mod client;
pub mod config;
pub mod coordinator;
pub mod diff;
pub mod fetch;
pub mod output;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod stats;
pub mod worker;

// Re-export commonly used types
pub use coordinator::MeasurementCoordinator;
pub use protocol::AggregateResponse;
pub use registry::WorkerRegistry;
pub use stats::LatencyStats;

/// Result type used throughout WebPulse
pub type Result<T> = anyhow::Result<T>;
