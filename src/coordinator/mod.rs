//! Measurement coordinator
//!
//! Server-side scatter/gather engine. On a client request the coordinator:
//! - snapshots the worker registry
//! - issues one concurrent measurement call per worker, each held by an
//!   explicit task handle and bounded by a per-call timeout
//! - joins the fan-in, excluding failed or timed-out workers without
//!   failing the round
//! - aggregates the surviving sample sets into per-worker latency stats
//!   and (for website measurements) a pairwise consistency matrix
//!
//! A timed-out worker's in-flight call is abandoned; its late response, if
//! any, is discarded with the task. Retries are a client-level concern.

use crate::diff;
use crate::protocol::{
    read_message, write_message, AggregateResponse, FetchAndMeasureRequest, Message, Sample,
    SampleSet,
};
use crate::registry::WorkerRegistry;
use crate::stats;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;

/// Malformed client request, rejected before any fan-out
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("samples_per_worker must be >= 1")]
    ZeroSamples,
}

/// Outcome of one bounded worker call, ready for the fan-in join
type CallHandle = (String, JoinHandle<std::result::Result<Result<SampleSet>, Elapsed>>);

/// Server-side measurement orchestrator
pub struct MeasurementCoordinator {
    /// Live worker table (shared with the registration handler)
    registry: Arc<WorkerRegistry>,

    /// Bounded wait applied to each per-worker call
    call_timeout: Duration,
}

impl MeasurementCoordinator {
    pub fn new(registry: Arc<WorkerRegistry>, call_timeout: Duration) -> Self {
        Self {
            registry,
            call_timeout,
        }
    }

    /// Measure a website from every registered worker's vantage point
    ///
    /// Each worker performs `samples_per_worker` timed fetches of `uri` and
    /// reports latencies plus content digests. Workers that fail, time out,
    /// or report zero successful fetches are absent from the response. An
    /// empty fleet yields an empty (valid) response.
    pub async fn measure_website(
        &self,
        uri: &str,
        samples_per_worker: u32,
    ) -> Result<AggregateResponse> {
        if samples_per_worker == 0 {
            return Err(RequestError::ZeroSamples.into());
        }

        let workers = self.registry.list_all();
        if workers.is_empty() {
            log::info!("MeasureWebsite: no workers registered, returning empty response");
            return Ok(AggregateResponse {
                stats: BTreeMap::new(),
                diff: Some(BTreeMap::new()),
            });
        }

        log::info!(
            "MeasureWebsite: fanning out to {} workers (uri={}, samples={})",
            workers.len(),
            uri,
            samples_per_worker
        );

        let mut handles: Vec<CallHandle> = Vec::with_capacity(workers.len());
        for address in workers {
            let call_address = address.clone();
            let uri = uri.to_string();
            let timeout = self.call_timeout;

            let handle = tokio::spawn(async move {
                tokio::time::timeout(
                    timeout,
                    call_fetch_and_measure(&call_address, &uri, samples_per_worker),
                )
                .await
            });

            handles.push((address, handle));
        }

        let sets = self.join_calls(handles).await;

        let mut per_worker_stats = BTreeMap::new();
        let mut digests = BTreeMap::new();

        for (address, set) in sets {
            let latencies = set.successful_latencies();
            match stats::summarize(&latencies) {
                Some(summary) => {
                    if !set.digests_agree() {
                        log::warn!(
                            "Worker {} observed changing content for {} during measurement",
                            address,
                            uri
                        );
                    }
                    if let Some(digest) = set.first_successful_digest() {
                        digests.insert(address.clone(), digest.to_string());
                    }
                    per_worker_stats.insert(address, summary);
                }
                None => {
                    log::warn!(
                        "Worker {}: all {} fetches failed, excluding from response",
                        address,
                        set.samples.len()
                    );
                }
            }
        }

        Ok(AggregateResponse {
            stats: per_worker_stats,
            diff: Some(diff::consistency_matrix(&digests)),
        })
    }

    /// Measure round-trip latency from the server to every registered worker
    ///
    /// Same scatter/gather shape as [`measure_website`](Self::measure_website),
    /// but each per-worker call times `samples_per_worker` sequential
    /// Ping/Pong round-trips on one connection, observed at the coordinator
    /// so the observation point is consistent across the fleet. No content
    /// is fetched, so the response carries no consistency matrix.
    ///
    /// The per-call timeout bounds the whole ping loop for one worker.
    pub async fn probe_workers(&self, samples_per_worker: u32) -> Result<AggregateResponse> {
        if samples_per_worker == 0 {
            return Err(RequestError::ZeroSamples.into());
        }

        let workers = self.registry.list_all();
        if workers.is_empty() {
            log::info!("GetWorkers: no workers registered, returning empty response");
            return Ok(AggregateResponse::default());
        }

        log::info!(
            "GetWorkers: probing {} workers ({} round-trips each)",
            workers.len(),
            samples_per_worker
        );

        let mut handles: Vec<CallHandle> = Vec::with_capacity(workers.len());
        for address in workers {
            let call_address = address.clone();
            let timeout = self.call_timeout;

            let handle = tokio::spawn(async move {
                tokio::time::timeout(timeout, time_pings(&call_address, samples_per_worker)).await
            });

            handles.push((address, handle));
        }

        let sets = self.join_calls(handles).await;

        let mut per_worker_stats = BTreeMap::new();
        for (address, set) in sets {
            if let Some(summary) = stats::summarize(&set.successful_latencies()) {
                per_worker_stats.insert(address, summary);
            }
        }

        Ok(AggregateResponse {
            stats: per_worker_stats,
            diff: None,
        })
    }

    /// Fan-in join point
    ///
    /// Waits for every task to complete or hit its timeout. Failures are
    /// recovered locally: the worker is excluded and logged, never surfaced
    /// as a failure of the round. Results stay keyed by the address the call
    /// was issued to, so the response is independent of arrival order.
    async fn join_calls(&self, handles: Vec<CallHandle>) -> Vec<(String, SampleSet)> {
        let mut sets = Vec::with_capacity(handles.len());

        for (address, handle) in handles {
            match handle.await {
                Ok(Ok(Ok(set))) => sets.push((address, set)),
                Ok(Ok(Err(e))) => {
                    log::warn!("Worker {} call failed: {:#}", address, e);
                }
                Ok(Err(_)) => {
                    log::warn!(
                        "Worker {} timed out after {:?}, excluding from this round",
                        address,
                        self.call_timeout
                    );
                }
                Err(e) => {
                    log::warn!("Measurement task for {} did not complete: {}", address, e);
                }
            }
        }

        sets
    }
}

/// One FetchAndMeasure RPC to a single worker
async fn call_fetch_and_measure(
    address: &str,
    uri: &str,
    samples_per_worker: u32,
) -> Result<SampleSet> {
    let mut stream = TcpStream::connect(address)
        .await
        .with_context(|| format!("Failed to connect to worker {}", address))?;

    let request = FetchAndMeasureRequest {
        uri: uri.to_string(),
        samples_per_worker,
    };
    write_message(&mut stream, &Message::FetchAndMeasure(request))
        .await
        .with_context(|| format!("Failed to send FETCH_AND_MEASURE to {}", address))?;

    match read_message(&mut stream).await? {
        Message::Samples(set) => Ok(set),
        Message::Error(err) => anyhow::bail!("Worker {} reported error: {}", address, err.error),
        other => anyhow::bail!("Expected SAMPLES from {}, got {:?}", address, other),
    }
}

/// Time sequential Ping/Pong round-trips to a single worker
///
/// All samples are taken on one connection; connection setup is paid once
/// and excluded from the measured round-trips.
async fn time_pings(address: &str, samples_per_worker: u32) -> Result<SampleSet> {
    let mut stream = TcpStream::connect(address)
        .await
        .with_context(|| format!("Failed to connect to worker {}", address))?;

    let mut samples = Vec::with_capacity(samples_per_worker as usize);
    for _ in 0..samples_per_worker {
        let start = Instant::now();
        write_message(&mut stream, &Message::Ping).await?;
        match read_message(&mut stream).await? {
            Message::Pong => samples.push(Sample {
                latency_ms: start.elapsed().as_millis() as u64,
                digest: String::new(),
                success: true,
            }),
            other => anyhow::bail!("Expected PONG from {}, got {:?}", address, other),
        }
    }

    Ok(SampleSet {
        worker: address.to_string(),
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Behavior of a scripted in-process worker
    #[derive(Clone, Copy)]
    enum MockBehavior {
        /// Answer FetchAndMeasure with samples carrying this digest,
        /// and Ping with Pong
        Respond { digest: &'static str },
        /// All fetches fail
        AllFailed,
        /// Accept the connection but never answer
        Hang,
    }

    /// Spawn a protocol-speaking worker on loopback, returning its address
    async fn spawn_mock_worker(behavior: MockBehavior) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };

                match behavior {
                    MockBehavior::Hang => {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    MockBehavior::AllFailed => {
                        if let Ok(Message::FetchAndMeasure(req)) = read_message(&mut stream).await {
                            let samples = (0..req.samples_per_worker)
                                .map(|_| Sample {
                                    latency_ms: 5,
                                    digest: String::new(),
                                    success: false,
                                })
                                .collect();
                            let set = SampleSet {
                                worker: "mock".to_string(),
                                samples,
                            };
                            let _ = write_message(&mut stream, &Message::Samples(set)).await;
                        }
                    }
                    MockBehavior::Respond { digest } => {
                        while let Ok(msg) = read_message(&mut stream).await {
                            match msg {
                                Message::FetchAndMeasure(req) => {
                                    let samples = (0..req.samples_per_worker)
                                        .map(|i| Sample {
                                            latency_ms: 10 + (i as u64 * 13) % 40,
                                            digest: digest.to_string(),
                                            success: true,
                                        })
                                        .collect();
                                    let set = SampleSet {
                                        worker: "mock".to_string(),
                                        samples,
                                    };
                                    if write_message(&mut stream, &Message::Samples(set))
                                        .await
                                        .is_err()
                                    {
                                        break;
                                    }
                                }
                                Message::Ping => {
                                    if write_message(&mut stream, &Message::Pong).await.is_err() {
                                        break;
                                    }
                                }
                                _ => break,
                            }
                        }
                    }
                }
            }
        });

        address
    }

    fn coordinator_with(workers: &[String], timeout_ms: u64) -> MeasurementCoordinator {
        let registry = Arc::new(WorkerRegistry::new());
        for worker in workers {
            registry.register(worker).unwrap();
        }
        MeasurementCoordinator::new(registry, Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn test_measure_website_consistent_fleet() {
        let workers = vec![
            spawn_mock_worker(MockBehavior::Respond { digest: "aaaa" }).await,
            spawn_mock_worker(MockBehavior::Respond { digest: "aaaa" }).await,
            spawn_mock_worker(MockBehavior::Respond { digest: "aaaa" }).await,
        ];
        let coordinator = coordinator_with(&workers, 2000);

        let response = coordinator
            .measure_website("http://example.com", 3)
            .await
            .unwrap();

        assert_eq!(response.stats.len(), 3);
        for stats in response.stats.values() {
            assert!(stats.min <= stats.median);
            assert!(stats.median <= stats.max);
        }

        let diff = response.diff.unwrap();
        assert_eq!(diff.len(), 3);
        for row in diff.values() {
            assert!(row.values().all(|&consistent| consistent));
        }
    }

    #[tokio::test]
    async fn test_measure_website_divergent_content() {
        let consistent_a = spawn_mock_worker(MockBehavior::Respond { digest: "aaaa" }).await;
        let consistent_b = spawn_mock_worker(MockBehavior::Respond { digest: "aaaa" }).await;
        let divergent = spawn_mock_worker(MockBehavior::Respond { digest: "bbbb" }).await;
        let coordinator = coordinator_with(
            &[consistent_a.clone(), consistent_b.clone(), divergent.clone()],
            2000,
        );

        let response = coordinator
            .measure_website("http://example.com", 2)
            .await
            .unwrap();

        let diff = response.diff.unwrap();
        assert!(diff[&consistent_a][&consistent_b]);
        assert!(!diff[&consistent_a][&divergent]);
        assert!(!diff[&consistent_b][&divergent]);
    }

    #[tokio::test]
    async fn test_measure_website_excludes_timed_out_worker() {
        let fast_a = spawn_mock_worker(MockBehavior::Respond { digest: "aaaa" }).await;
        let fast_b = spawn_mock_worker(MockBehavior::Respond { digest: "aaaa" }).await;
        let hung = spawn_mock_worker(MockBehavior::Hang).await;
        let coordinator = coordinator_with(&[fast_a.clone(), fast_b.clone(), hung.clone()], 500);

        let response = coordinator
            .measure_website("http://example.com", 3)
            .await
            .unwrap();

        assert_eq!(response.stats.len(), 2);
        assert!(response.stats.contains_key(&fast_a));
        assert!(response.stats.contains_key(&fast_b));
        assert!(!response.stats.contains_key(&hung));

        // Matrix restricted to the responsive pair
        let diff = response.diff.unwrap();
        assert_eq!(diff.len(), 2);
        assert!(!diff.contains_key(&hung));
    }

    #[tokio::test]
    async fn test_measure_website_excludes_all_failed_worker() {
        let healthy = spawn_mock_worker(MockBehavior::Respond { digest: "aaaa" }).await;
        let broken = spawn_mock_worker(MockBehavior::AllFailed).await;
        let coordinator = coordinator_with(&[healthy.clone(), broken.clone()], 2000);

        let response = coordinator
            .measure_website("http://example.com", 2)
            .await
            .unwrap();

        assert_eq!(response.stats.len(), 1);
        assert!(response.stats.contains_key(&healthy));
        assert_eq!(response.diff.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_measure_website_survives_connection_refused() {
        let healthy = spawn_mock_worker(MockBehavior::Respond { digest: "aaaa" }).await;
        // Bind then drop to get an address nothing listens on
        let dead = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let coordinator = coordinator_with(&[healthy.clone(), dead], 2000);

        let response = coordinator
            .measure_website("http://example.com", 1)
            .await
            .unwrap();

        assert_eq!(response.stats.len(), 1);
        assert!(response.stats.contains_key(&healthy));
    }

    #[tokio::test]
    async fn test_zero_samples_rejected_before_fan_out() {
        let coordinator = coordinator_with(&[], 2000);

        let err = coordinator
            .measure_website("http://example.com", 0)
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<RequestError>(),
            Some(&RequestError::ZeroSamples)
        );

        let err = coordinator.probe_workers(0).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<RequestError>(),
            Some(&RequestError::ZeroSamples)
        );
    }

    #[tokio::test]
    async fn test_empty_fleet_is_valid() {
        let coordinator = coordinator_with(&[], 2000);

        let response = coordinator
            .measure_website("http://example.com", 3)
            .await
            .unwrap();
        assert!(response.stats.is_empty());
        assert!(response.diff.unwrap().is_empty());

        let response = coordinator.probe_workers(3).await.unwrap();
        assert!(response.stats.is_empty());
        assert!(response.diff.is_none());
    }

    #[tokio::test]
    async fn test_probe_workers_round_trips() {
        let workers = vec![
            spawn_mock_worker(MockBehavior::Respond { digest: "aaaa" }).await,
            spawn_mock_worker(MockBehavior::Respond { digest: "aaaa" }).await,
        ];
        let coordinator = coordinator_with(&workers, 2000);

        let response = coordinator.probe_workers(4).await.unwrap();

        assert_eq!(response.stats.len(), 2);
        assert!(response.diff.is_none());
        for stats in response.stats.values() {
            assert!(stats.min <= stats.median && stats.median <= stats.max);
        }
    }
}
