use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::error::Result;
use crate::error::ThrottleError;
use crate::events::EventListeners;
use crate::events::ListenerId;
use crate::events::ThrottleEvent;
use crate::pipeline::Pipeline;
use crate::time;

/// Receipt for an admitted request
///
/// Holds the consumption instant of every pipeline that was charged, so the
/// charge can be reversed with `refund` if the downstream call fails.
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    owner: u64,
    cost: u32,
    stamps: Vec<(usize, Instant)>,
}

impl Admission {
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Pipeline indices charged by this admission and their consumption instants
    pub fn consumed_at(&self) -> &[(usize, Instant)] {
        &self.stamps
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

static NEXT_THROTTLER_ID: AtomicU64 = AtomicU64::new(0);

/// Coordinator enforcing several pipelines atomically
///
/// Some exchanges enforce multiple limits simultaneously (raw requests per
/// five minutes, request weight per minute, orders per ten seconds). A request
/// is admitted only when every pipeline can absorb its cost, and all pipelines
/// are charged together under one mutex.
///
/// Wait estimates are computed without the mutex so sleeping callers never hold
/// it; the check-and-commit runs under the mutex with no await point in
/// between, which also makes dropping a waiting `check_and_wait` safe. Arrival
/// order is not preserved: a small request may overtake a waiting large one.
///
/// Each pipeline counts the commits made against it. A caller whose pipelines
/// were charged by someone else while it slept re-estimates its wait instead
/// of committing, so concurrent callers under soft pacing are spread out
/// rather than released together.
pub struct Throttler {
    id: u64,
    pipelines: Vec<Pipeline>,
    commits: Vec<AtomicU64>,
    all: Vec<usize>,
    admission: Mutex<()>,
    listeners: Arc<EventListeners>,
}

impl Throttler {
    /// Create a throttler over `pipelines`
    ///
    /// Every pipeline's events are forwarded to the throttler's own listeners.
    pub fn new(pipelines: Vec<Pipeline>) -> Result<Self> {
        let mut labels = HashSet::new();
        for pipeline in &pipelines {
            if !labels.insert(pipeline.label()) {
                return Err(ThrottleError::InvalidConfig(format!("duplicate pipeline label '{}'", pipeline.label())));
            }
        }

        let listeners = Arc::new(EventListeners::new());
        for pipeline in &pipelines {
            let hub = Arc::clone(&listeners);
            pipeline.add_event_listener(move |event| hub.emit(event));
        }

        let all = (0..pipelines.len()).collect();
        let commits = pipelines.iter().map(|_| AtomicU64::new(0)).collect();
        let id = NEXT_THROTTLER_ID.fetch_add(1, Ordering::Relaxed);
        Ok(Self { id, pipelines, commits, all, admission: Mutex::new(()), listeners })
    }

    /// Create a throttler builder
    pub fn builder() -> ThrottlerBuilder {
        ThrottlerBuilder::new()
    }

    /// Wait until every pipeline can absorb `cost`, then charge all of them
    ///
    /// Never fails because of contention; the only error is a cost that
    /// exceeds some pipeline's total capacity and could never be admitted.
    pub async fn check_and_wait(&self, cost: u32) -> Result<Admission> {
        self.admit(&self.all, cost).await
    }

    /// Reverse the charges recorded in `admission`
    ///
    /// Best-effort: stale or unknown entries are skipped, and an admission
    /// issued by a different throttler is ignored.
    pub fn refund(&self, admission: &Admission) {
        if admission.owner != self.id {
            warn!(cost = admission.cost, "Ignoring refund of an admission issued by another throttler");
            return;
        }

        let now = time::now();
        for &(index, consumed_at) in &admission.stamps {
            if let Some(pipeline) = self.pipelines.get(index) {
                pipeline.refund_at(consumed_at, admission.cost, now);
            }
        }
    }

    /// Longest delay any pipeline currently asks for before admitting `cost`
    pub fn wait_time(&self, cost: u32) -> Duration {
        self.wait_time_for(&self.all, cost, time::now())
    }

    pub fn add_event_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&ThrottleEvent) + Send + Sync + 'static,
    {
        self.listeners.add(callback)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    pub fn pipeline(&self, label: &str) -> Option<&Pipeline> {
        self.index_of(label).map(|index| &self.pipelines[index])
    }

    pub(crate) fn index_of(&self, label: &str) -> Option<usize> {
        self.pipelines.iter().position(|p| p.label() == label)
    }

    pub(crate) fn wait_time_for(&self, selected: &[usize], cost: u32, now: Instant) -> Duration {
        selected.iter().map(|&index| self.pipelines[index].wait_time_at(cost, now)).max().unwrap_or(Duration::ZERO)
    }

    /// Total commits made against the `selected` pipelines
    fn commits_for(&self, selected: &[usize]) -> u64 {
        selected.iter().map(|&index| self.commits[index].load(Ordering::Acquire)).sum()
    }

    /// Admission loop restricted to the `selected` pipelines
    pub(crate) async fn admit(&self, selected: &[usize], cost: u32) -> Result<Admission> {
        if cost == 0 || selected.is_empty() {
            return Ok(Admission { owner: self.id, cost, stamps: Vec::new() });
        }

        for &index in selected {
            let pipeline = &self.pipelines[index];
            let limit = pipeline.window().limit();
            if cost > limit {
                return Err(ThrottleError::CostExceedsCapacity { label: pipeline.label().to_string(), cost, limit });
            }
        }

        let mut attempts: u32 = 0;
        loop {
            // Optimistic estimate outside the lock
            let observed = self.commits_for(selected);
            let wait = self.wait_time_for(selected, cost, time::now());
            if !wait.is_zero() {
                debug!(cost, wait_ms = wait.as_millis() as u64, "Waiting for capacity");
                tokio::time::sleep(wait).await;
            }

            {
                let _guard = self.admission.lock().await;
                let now = time::now();

                // Budget moved while we slept: pace against the new state
                if self.commits_for(selected) != observed && !self.wait_time_for(selected, cost, now).is_zero() {
                    attempts += 1;
                    debug!(cost, attempts, "Pipelines charged while waiting, re-estimating");
                    continue;
                }

                if selected.iter().all(|&index| self.pipelines[index].can_send_at(cost, now)) {
                    let stamps = selected
                        .iter()
                        .map(|&index| {
                            self.commits[index].fetch_add(1, Ordering::Release);
                            (index, self.pipelines[index].consume_at(cost, now))
                        })
                        .collect();
                    return Ok(Admission { owner: self.id, cost, stamps });
                }
            }

            // Another caller consumed the budget while we slept
            attempts += 1;
            debug!(cost, attempts, "Lost admission race, retrying");
            tokio::task::yield_now().await;
        }
    }
}

impl std::fmt::Debug for Throttler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttler").field("pipelines", &self.pipelines).field("listeners", &self.listeners).finish()
    }
}

/// Builder for creating a throttler
pub struct ThrottlerBuilder {
    pipelines: Vec<Pipeline>,
}

impl ThrottlerBuilder {
    pub fn new() -> Self {
        Self { pipelines: Vec::new() }
    }

    /// Add a pipeline; pipelines are checked in insertion order
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    pub fn build(self) -> Result<Throttler> {
        Throttler::new(self.pipelines)
    }
}

impl Default for ThrottlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
