//! Latency statistics
//!
//! Order statistics over the small, noisy sample sets workers report.
//! Aggregation is deliberately kept out of the workers and the transport:
//! a pure function over a slice of latencies, testable without a network.

use serde::{Deserialize, Serialize};

/// Summary of a set of latency measurements to a host
///
/// Immutable once computed; derived once per worker per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Min measured latency in milliseconds
    pub min: u64,

    /// Median measured latency in milliseconds
    pub median: u64,

    /// Max measured latency in milliseconds
    pub max: u64,
}

/// Summarize a sequence of latency samples into {min, median, max}
///
/// Returns `None` for an empty input: a worker whose fetches all failed is
/// excluded from the response entirely, so there is nothing to summarize.
///
/// For an even number of samples the median is the lower of the two middle
/// order statistics. Sorts a copy; the caller's ordering is untouched, and
/// the result does not depend on it.
pub fn summarize(samples: &[u64]) -> Option<LatencyStats> {
    if samples.is_empty() {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();

    Some(LatencyStats {
        min: sorted[0],
        median: sorted[(sorted.len() - 1) / 2],
        max: sorted[sorted.len() - 1],
    })
}
