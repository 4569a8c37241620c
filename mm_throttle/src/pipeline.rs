use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;
use crate::error::ThrottleError;
use crate::events::EventListeners;
use crate::events::ListenerId;
use crate::events::ThrottleEvent;
use crate::time;
use crate::window::Window;
use crate::window::WindowConfig;
use crate::window::WindowKind;

/// One governed budget: a window plus a label and threshold alerts
///
/// When `event_threshold` is set, the first consumption that leaves the
/// remaining rate below it emits a [`ThrottleEvent`] and latches. The latch
/// re-arms once a refund or capacity check observes the rate back at or above
/// the threshold, so a pipeline hovering below its threshold alerts once.
pub struct Pipeline {
    label: Arc<str>,
    window: Box<dyn Window>,
    event_threshold: Option<f64>,
    below_threshold: AtomicBool,
    listeners: EventListeners,
}

impl Pipeline {
    pub fn new(label: impl Into<Arc<str>>, window: Box<dyn Window>) -> Self {
        Self { label: label.into(), window, event_threshold: None, below_threshold: AtomicBool::new(false), listeners: EventListeners::new() }
    }

    /// Create a pipeline around a freshly built window
    pub fn with_config(label: impl Into<Arc<str>>, kind: WindowKind, config: WindowConfig) -> Result<Self> {
        Ok(Self::new(label, config.build(kind)?))
    }

    pub fn fixed(label: impl Into<Arc<str>>, config: WindowConfig) -> Result<Self> {
        Self::with_config(label, WindowKind::Fixed, config)
    }

    pub fn sliding(label: impl Into<Arc<str>>, config: WindowConfig) -> Result<Self> {
        Self::with_config(label, WindowKind::Sliding, config)
    }

    /// Emit an event when the remaining rate drops below `threshold`
    pub fn with_event_threshold(mut self, threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ThrottleError::InvalidConfig(format!("event threshold {threshold} for '{}' is outside 0..=1", self.label)));
        }
        self.event_threshold = Some(threshold);
        Ok(self)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn window(&self) -> &dyn Window {
        self.window.as_ref()
    }

    pub fn event_threshold(&self) -> Option<f64> {
        self.event_threshold
    }

    /// Whether an event fired and has not been re-armed yet
    pub fn is_below_threshold(&self) -> bool {
        self.below_threshold.load(Ordering::Acquire)
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

    pub fn can_send(&self, cost: u32) -> bool {
        self.can_send_at(cost, time::now())
    }

    pub fn can_send_at(&self, cost: u32, now: Instant) -> bool {
        let allowed = self.window.can_send_at(cost, now);
        self.rearm_if_recovered(now);
        allowed
    }

    pub fn consume(&self, cost: u32) -> Instant {
        self.consume_at(cost, time::now())
    }

    pub fn consume_at(&self, cost: u32, now: Instant) -> Instant {
        let stamp = self.window.consume_at(cost, now);

        if let Some(threshold) = self.event_threshold {
            let rate = self.window.remaining_rate_at(now);
            if rate < threshold && !self.below_threshold.swap(true, Ordering::AcqRel) {
                let event = ThrottleEvent { label: Arc::clone(&self.label), remaining_rate: rate, remaining_cap: self.window.remaining_at(now) };
                debug!(label = %self.label, rate, remaining = event.remaining_cap, "Pipeline crossed event threshold");
                self.listeners.emit(&event);
            }
        }

        stamp
    }

    /// Best-effort reversal of a consumption recorded at `consumed_at`
    pub fn refund(&self, consumed_at: Instant, cost: u32) {
        self.refund_at(consumed_at, cost, time::now())
    }

    pub fn refund_at(&self, consumed_at: Instant, cost: u32, now: Instant) {
        self.window.refund_at(consumed_at, cost, now);
        self.rearm_if_recovered(now);
    }

    pub fn wait_time(&self, cost: u32) -> Duration {
        self.window.wait_time(cost)
    }

    pub fn wait_time_at(&self, cost: u32, now: Instant) -> Duration {
        self.window.wait_time_at(cost, now)
    }

    pub fn remaining_rate(&self) -> f64 {
        self.window.remaining_rate()
    }

    #[inline]
    fn rearm_if_recovered(&self, now: Instant) {
        let Some(threshold) = self.event_threshold else {
            return;
        };

        if self.below_threshold.load(Ordering::Acquire) && self.window.remaining_rate_at(now) >= threshold {
            self.below_threshold.store(false, Ordering::Release);
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("label", &self.label)
            .field("limit", &self.window.limit())
            .field("window", &self.window.window())
            .field("event_threshold", &self.event_threshold)
            .field("below_threshold", &self.is_below_threshold())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting(pipeline: &Pipeline) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        pipeline.add_event_listener(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        hits
    }

    #[test]
    fn test_event_hysteresis() {
        let pipeline = Pipeline::fixed("weight", WindowConfig::per_minute(100)).unwrap().with_event_threshold(0.8).unwrap();
        let hits = counting(&pipeline);
        let now = time::now();

        let stamp = pipeline.consume_at(25, now);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert!(pipeline.is_below_threshold());

        // Still below threshold: latched
        let small = pipeline.consume_at(1, now);
        assert_eq!(hits.load(Ordering::Relaxed), 1);

        // Back to 0.99 re-arms the latch
        pipeline.refund_at(stamp, 25, now);
        assert!(!pipeline.is_below_threshold());

        pipeline.refund_at(small, 1, now);
        pipeline.consume_at(30, now);
        assert_eq!(hits.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_event_payload() {
        let pipeline = Pipeline::sliding("orders", WindowConfig::per_second(10)).unwrap().with_event_threshold(0.5).unwrap();
        let seen: Arc<parking_lot::Mutex<Vec<ThrottleEvent>>> = Arc::default();

        let sink = Arc::clone(&seen);
        pipeline.add_event_listener(move |event| sink.lock().push(event.clone()));

        pipeline.consume_at(7, time::now());

        let events = seen.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(&*events[0].label, "orders");
        assert_eq!(events[0].remaining_cap, 3);
        assert!((events[0].remaining_rate - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_can_send_rearms_after_reset() {
        let pipeline = Pipeline::fixed("burst", WindowConfig::new(10, Duration::from_millis(100))).unwrap().with_event_threshold(0.5).unwrap();
        let hits = counting(&pipeline);
        let start = time::now();

        pipeline.consume_at(8, start);
        assert!(pipeline.is_below_threshold());

        assert!(pipeline.can_send_at(1, start + Duration::from_millis(150)));
        assert!(!pipeline.is_below_threshold());

        pipeline.consume_at(8, start + Duration::from_millis(150));
        assert_eq!(hits.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_no_threshold_no_events() {
        let pipeline = Pipeline::fixed("quiet", WindowConfig::per_second(10)).unwrap();
        let hits = counting(&pipeline);

        pipeline.consume(10);
        assert_eq!(hits.load(Ordering::Relaxed), 0);
        assert!(!pipeline.is_below_threshold());
    }

    #[test]
    fn test_invalid_event_threshold() {
        let result = Pipeline::fixed("bad", WindowConfig::per_second(10)).unwrap().with_event_threshold(1.2);
        assert!(matches!(result, Err(ThrottleError::InvalidConfig(_))));
    }

    #[test]
    fn test_remove_listener() {
        let pipeline = Pipeline::fixed("weight", WindowConfig::per_second(10)).unwrap().with_event_threshold(0.9).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = pipeline.add_event_listener(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        assert!(pipeline.remove_event_listener(id));
        pipeline.consume(5);
        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }
}
