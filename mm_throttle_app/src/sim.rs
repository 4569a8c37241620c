use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use mm_throttle::CategorizedThrottler;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config_loader::SimEndpoint;

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub workers: usize,
    pub duration: Duration,
    /// Simulated round trip of the downstream call
    pub request_latency: Duration,
    /// Every n-th request per worker fails and is refunded; 0 disables failures
    pub refund_every: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self { workers: 8, duration: Duration::from_secs(30), request_latency: Duration::from_millis(20), refund_every: 10 }
    }
}

/// Aggregate counters over every worker
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimReport {
    pub admitted: u64,
    pub refunded: u64,
    pub rejected: u64,
    pub events: u64,
    pub total_cost: u64,
    pub total_wait: Duration,
    pub max_wait: Duration,
}

impl SimReport {
    fn merge(&mut self, other: &SimReport) {
        self.admitted += other.admitted;
        self.refunded += other.refunded;
        self.rejected += other.rejected;
        self.total_cost += other.total_cost;
        self.total_wait += other.total_wait;
        self.max_wait = self.max_wait.max(other.max_wait);
    }

    pub fn mean_wait(&self) -> Duration {
        if self.admitted == 0 {
            return Duration::ZERO;
        }
        self.total_wait / u32::try_from(self.admitted).unwrap_or(u32::MAX)
    }
}

/// Drive `workers` concurrent request loops through the throttler until the
/// duration elapses or `running` is cleared
pub async fn run(throttler: Arc<CategorizedThrottler>, endpoints: Arc<[SimEndpoint]>, config: SimConfig, running: Arc<AtomicBool>) -> SimReport {
    let events = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&events);
    let listener = throttler.add_event_listener(move |event| {
        counter.fetch_add(1, Ordering::Relaxed);
        info!(
            pipeline = %event.label,
            remaining_rate = event.remaining_rate,
            remaining = event.remaining_cap,
            "Pipeline crossed its event threshold"
        );
    });

    let deadline = Instant::now() + config.duration;
    let mut handles = Vec::with_capacity(config.workers);
    for worker in 0..config.workers {
        let throttler = Arc::clone(&throttler);
        let endpoints = Arc::clone(&endpoints);
        let running = Arc::clone(&running);
        let config = config.clone();
        handles.push(tokio::spawn(async move { run_worker(worker, &throttler, &endpoints, &config, &running, deadline).await }));
    }

    let mut report = SimReport::default();
    for handle in handles {
        match handle.await {
            Ok(stats) => report.merge(&stats),
            Err(err) => warn!("Simulator worker failed: {err}"),
        }
    }

    throttler.remove_event_listener(listener);
    report.events = events.load(Ordering::Relaxed);
    report
}

async fn run_worker(
    worker: usize,
    throttler: &CategorizedThrottler,
    endpoints: &[SimEndpoint],
    config: &SimConfig,
    running: &AtomicBool,
    deadline: Instant,
) -> SimReport {
    let mut stats = SimReport::default();
    if endpoints.is_empty() {
        return stats;
    }

    let mut sent = 0u64;
    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        let endpoint = &endpoints[(worker + sent as usize) % endpoints.len()];
        let params: Vec<(&str, &str)> = endpoint.params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

        let start = Instant::now();
        let admission = match tokio::time::timeout_at(deadline, throttler.check_and_wait_endpoint(endpoint.verb, &endpoint.resource, &params)).await {
            Err(_) => break,
            Ok(Err(err)) => {
                // A rejected endpoint rejects every time
                warn!(worker, verb = %endpoint.verb, resource = %endpoint.resource, "Admission rejected: {err}");
                stats.rejected += 1;
                break;
            }
            Ok(Ok(admission)) => admission,
        };

        let waited = start.elapsed();
        stats.admitted += 1;
        stats.total_cost += u64::from(admission.cost());
        stats.total_wait += waited;
        stats.max_wait = stats.max_wait.max(waited);
        sent += 1;

        if !config.request_latency.is_zero() {
            tokio::time::sleep(config.request_latency).await;
        }

        if config.refund_every > 0 && sent % config.refund_every == 0 {
            debug!(worker, resource = %endpoint.resource, cost = admission.cost(), "Request failed, refunding");
            throttler.refund(&admission);
            stats.refunded += 1;
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use mm_throttle::CostTable;
    use mm_throttle::Pipeline;
    use mm_throttle::UnknownEndpointPolicy;
    use mm_throttle::Verb;
    use mm_throttle::WindowConfig;

    use super::*;

    fn per_second(limit: u32) -> Arc<CategorizedThrottler> {
        let costs = CostTable::new(UnknownEndpointPolicy::Reject).with_endpoint(Verb::Get, "/ping", 1, "rest");
        Arc::new(
            CategorizedThrottler::builder()
                .with_pipeline("rest", Pipeline::fixed("rest_second", WindowConfig::per_second(limit)).unwrap())
                .with_costs(costs)
                .build()
                .unwrap(),
        )
    }

    fn ping() -> Arc<[SimEndpoint]> {
        Arc::from(vec![SimEndpoint::new(Verb::Get, "/ping")])
    }

    fn config(workers: usize, seconds: u64, refund_every: u64) -> SimConfig {
        SimConfig { workers, duration: Duration::from_secs(seconds), request_latency: Duration::ZERO, refund_every }
    }

    #[tokio::test(start_paused = true)]
    async fn test_admissions_bounded_by_capacity() {
        let report = run(per_second(5), ping(), config(3, 3, 0), Arc::new(AtomicBool::new(true))).await;

        assert!(report.admitted >= 15 && report.admitted <= 20, "admitted {}", report.admitted);
        assert_eq!(report.total_cost, report.admitted);
        assert_eq!(report.rejected, 0);
        assert!(report.max_wait > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refunds_are_counted() {
        let report = run(per_second(4), ping(), config(1, 2, 2), Arc::new(AtomicBool::new(true))).await;

        assert!(report.refunded > 0);
        assert_eq!(report.refunded, report.admitted / 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_endpoint_stops_worker() {
        let endpoints: Arc<[SimEndpoint]> = Arc::from(vec![SimEndpoint::new(Verb::Post, "/missing")]);
        let report = run(per_second(5), endpoints, config(2, 5, 0), Arc::new(AtomicBool::new(true))).await;

        assert_eq!(report.rejected, 2);
        assert_eq!(report.admitted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_before_start() {
        let report = run(per_second(5), ping(), config(4, 5, 0), Arc::new(AtomicBool::new(false))).await;
        assert_eq!(report, SimReport::default());
    }

    #[test]
    fn test_mean_wait() {
        let report = SimReport { admitted: 4, total_wait: Duration::from_millis(100), ..SimReport::default() };
        assert_eq!(report.mean_wait(), Duration::from_millis(25));
        assert_eq!(SimReport::default().mean_wait(), Duration::ZERO);
    }
}
