//! Result rendering
//!
//! Human-readable text report and machine-readable JSON for an
//! [`AggregateResponse`].

use crate::protocol::AggregateResponse;
use anyhow::Result;

/// Print measurement results to console
pub fn print_results(response: &AggregateResponse) {
    println!("═══════════════════════════════════════════════════════════");
    println!("                 MEASUREMENT RESULTS");
    println!("═══════════════════════════════════════════════════════════");
    println!();

    if response.stats.is_empty() {
        println!("No workers responded.");
        println!();
    } else {
        println!("Latency per worker (ms):");
        println!("  {:<28} {:>8} {:>8} {:>8}", "worker", "min", "median", "max");
        for (worker, stats) in &response.stats {
            println!(
                "  {:<28} {:>8} {:>8} {:>8}",
                worker, stats.min, stats.median, stats.max
            );
        }
        println!();
    }

    if let Some(ref diff) = response.diff {
        println!("Content consistency:");
        if diff.len() < 2 {
            println!("  (fewer than two workers, nothing to compare)");
        } else {
            // Each unordered pair once
            for (worker_a, row) in diff {
                for (worker_b, &consistent) in row {
                    if worker_a < worker_b {
                        let verdict = if consistent { "consistent" } else { "DIVERGENT" };
                        println!("  {} <-> {} : {}", worker_a, worker_b, verdict);
                    }
                }
            }
        }
        println!();
    }

    println!("═══════════════════════════════════════════════════════════");
}

/// Print measurement results as pretty JSON
pub fn print_json(response: &AggregateResponse) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::LatencyStats;
    use std::collections::BTreeMap;

    #[test]
    fn test_json_round_trips() {
        let mut stats = BTreeMap::new();
        stats.insert(
            "10.0.1.10:7080".to_string(),
            LatencyStats { min: 10, median: 20, max: 30 },
        );
        let response = AggregateResponse { stats, diff: None };

        let json = serde_json::to_string(&response).unwrap();
        let parsed: AggregateResponse = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.stats["10.0.1.10:7080"].median, 20);
        assert!(parsed.diff.is_none());
    }
}
