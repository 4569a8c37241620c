use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::warn;

use crate::error::Result;
use crate::error::ThrottleError;
use crate::fixed_window::FixedWindow;
use crate::sliding_window::SlidingWindow;
use crate::time;

/// One capacity/time budget
///
/// Implementations keep their mutable state behind an internal lock so that
/// estimates (`can_send`, `wait_time`) can be read from any task. Admission
/// decisions that must hold across several windows are serialized one level up
/// by the throttler.
///
/// Every operation takes an explicit `now`; the provided methods without the
/// `_at` suffix read the tokio clock.
pub trait Window: Send + Sync {
    /// Static configuration of this window
    fn config(&self) -> &WindowConfig;

    /// Whether `cost` can be consumed at `now` without driving `remaining` below zero
    fn can_send_at(&self, cost: u32, now: Instant) -> bool;

    /// Consume `cost` and return the instant of consumption
    ///
    /// Does not check capacity: callers are expected to call `can_send_at` first.
    fn consume_at(&self, cost: u32, now: Instant) -> Instant;

    /// Reverse a prior consumption recorded at `consumed_at`
    fn refund_at(&self, consumed_at: Instant, cost: u32, now: Instant);

    /// Delay before `consume(cost)` should be attempted
    fn wait_time_at(&self, cost: u32, now: Instant) -> Duration;

    /// Remaining capacity at `now` after purging expired state
    fn remaining_at(&self, now: Instant) -> i64;

    /// Restore full capacity and start a fresh window
    fn reset(&self);

    fn can_send(&self, cost: u32) -> bool {
        self.can_send_at(cost, time::now())
    }

    fn consume(&self, cost: u32) -> Instant {
        self.consume_at(cost, time::now())
    }

    fn refund(&self, consumed_at: Instant, cost: u32) {
        self.refund_at(consumed_at, cost, time::now())
    }

    fn wait_time(&self, cost: u32) -> Duration {
        self.wait_time_at(cost, time::now())
    }

    fn remaining(&self) -> i64 {
        self.remaining_at(time::now())
    }

    /// Fraction of capacity still available, in `0.0..=1.0`
    fn remaining_rate_at(&self, now: Instant) -> f64 {
        remaining_rate(self.remaining_at(now), self.limit())
    }

    fn remaining_rate(&self) -> f64 {
        self.remaining_rate_at(time::now())
    }

    fn limit(&self) -> u32 {
        self.config().limit
    }

    fn window(&self) -> Duration {
        self.config().window
    }
}

/// Window strategy selector used by configuration files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// Counter that resets to full capacity at each window boundary
    Fixed,
    /// Rolling history where each consumption expires individually
    #[default]
    Sliding,
}

/// Capacity and smoothing parameters shared by every window strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowConfig {
    /// Capacity units allowed per window
    pub limit: u32,

    /// Window duration
    pub window: Duration,

    /// Upper bound on the proportional soft delay
    pub max_soft_delay: Duration,

    /// Remaining rate below which soft delays kick in (0 disables smoothing)
    pub soft_threshold: f64,
}

impl WindowConfig {
    pub const DEFAULT_MAX_SOFT_DELAY: Duration = Duration::from_secs(1);

    /// Longest accepted window; deadlines are computed as `Instant + window`
    pub const MAX_WINDOW: Duration = Duration::from_secs(366 * 86_400);

    /// Create a config with smoothing disabled
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window, max_soft_delay: Self::DEFAULT_MAX_SOFT_DELAY, soft_threshold: 0.0 }
    }

    pub fn per_second(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(1))
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn per_hour(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(3600))
    }

    pub fn per_day(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(86_400))
    }

    /// Set the remaining rate below which soft delays apply
    pub fn with_soft_threshold(mut self, soft_threshold: f64) -> Self {
        self.soft_threshold = soft_threshold;
        self
    }

    /// Set the cap on soft delays
    pub fn with_max_soft_delay(mut self, max_soft_delay: Duration) -> Self {
        self.max_soft_delay = max_soft_delay;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(ThrottleError::InvalidConfig("limit must be greater than 0".to_string()));
        }
        if self.window.is_zero() {
            return Err(ThrottleError::InvalidConfig("window duration must be greater than 0".to_string()));
        }
        if self.window > Self::MAX_WINDOW {
            return Err(ThrottleError::InvalidConfig(format!("window duration {:?} exceeds {:?}", self.window, Self::MAX_WINDOW)));
        }
        if !(0.0..=1.0).contains(&self.soft_threshold) {
            return Err(ThrottleError::InvalidConfig(format!("soft threshold {} is outside 0..=1", self.soft_threshold)));
        }
        Ok(())
    }

    /// Build a boxed window of the given kind
    pub fn build(self, kind: WindowKind) -> Result<Box<dyn Window>> {
        Ok(match kind {
            WindowKind::Fixed => Box::new(FixedWindow::new(self)?),
            WindowKind::Sliding => Box::new(SlidingWindow::new(self)?),
        })
    }
}

#[inline]
pub(crate) fn remaining_rate(remaining: i64, limit: u32) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    (remaining as f64 / f64::from(limit)).clamp(0.0, 1.0)
}

/// Whether `cost` must wait for the window to structurally free capacity
#[inline]
pub(crate) fn needs_hard_wait(remaining: i64, cost: u32) -> bool {
    remaining <= 0 || remaining < i64::from(cost)
}

/// Proportional delay applied while capacity is available but running low
///
/// `time_left` is the horizon over which the remaining capacity should be
/// spread. The result is `cost * time_left / remaining`, capped at
/// `max_soft_delay`.
pub(crate) fn soft_delay(config: &WindowConfig, remaining: i64, cost: u32, time_left: Duration) -> Duration {
    if cost == 0 || remaining <= 0 {
        return Duration::ZERO;
    }

    if remaining_rate(remaining, config.limit) >= config.soft_threshold {
        return Duration::ZERO;
    }

    let delay = time_left.mul_f64(f64::from(cost) / remaining as f64);
    if delay > config.max_soft_delay {
        warn!(
            limit = config.limit,
            remaining,
            cost,
            delay_ms = delay.as_millis() as u64,
            cap_ms = config.max_soft_delay.as_millis() as u64,
            "Soft delay capped, request rate is outrunning smoothing"
        );
        return config.max_soft_delay;
    }

    delay
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(WindowConfig::per_second(10).validate().is_ok());
        assert!(matches!(WindowConfig::per_second(0).validate(), Err(ThrottleError::InvalidConfig(_))));
        assert!(matches!(WindowConfig::new(10, Duration::ZERO).validate(), Err(ThrottleError::InvalidConfig(_))));
        assert!(WindowConfig::per_second(10).with_soft_threshold(1.5).validate().is_err());
        assert!(WindowConfig::per_second(10).with_soft_threshold(-0.1).validate().is_err());
    }

    #[test]
    fn test_validate_window_upper_bound() {
        assert!(WindowConfig::new(10, WindowConfig::MAX_WINDOW).validate().is_ok());
        assert!(matches!(WindowConfig::new(10, Duration::from_millis(u64::MAX)).validate(), Err(ThrottleError::InvalidConfig(_))));
        assert!(WindowConfig::per_day(10).build(WindowKind::Sliding).is_ok());
        assert!(matches!(WindowConfig::new(10, Duration::MAX).build(WindowKind::Fixed), Err(ThrottleError::InvalidConfig(_))));
    }

    #[test]
    fn test_presets() {
        assert_eq!(WindowConfig::per_minute(5).window, Duration::from_secs(60));
        assert_eq!(WindowConfig::per_hour(5).window, Duration::from_secs(3600));
        assert_eq!(WindowConfig::per_day(5).window, Duration::from_secs(86_400));
    }

    #[test]
    fn test_remaining_rate() {
        assert_eq!(remaining_rate(5, 10), 0.5);
        assert_eq!(remaining_rate(-3, 10), 0.0);
        assert_eq!(remaining_rate(5, 0), 0.0);
    }

    #[test]
    fn test_hard_wait_boundaries() {
        assert!(needs_hard_wait(0, 0));
        assert!(needs_hard_wait(-1, 1));
        assert!(needs_hard_wait(2, 3));
        assert!(!needs_hard_wait(3, 3));
    }

    #[test]
    fn test_soft_delay_regimes() {
        let config = WindowConfig::new(10, Duration::from_secs(60)).with_soft_threshold(0.5).with_max_soft_delay(Duration::from_secs(10));

        // Above threshold
        assert_eq!(soft_delay(&config, 6, 1, Duration::from_secs(30)), Duration::ZERO);

        // Below threshold: 1 * 20s / 4
        assert_eq!(soft_delay(&config, 4, 1, Duration::from_secs(20)), Duration::from_secs(5));

        // Capped
        assert_eq!(soft_delay(&config, 1, 1, Duration::from_secs(60)), Duration::from_secs(10));
    }

    #[test]
    fn test_build_kinds() {
        let fixed = WindowConfig::per_second(3).build(WindowKind::Fixed).unwrap();
        let sliding = WindowConfig::per_second(3).build(WindowKind::Sliding).unwrap();

        assert_eq!(fixed.limit(), 3);
        assert_eq!(sliding.window(), Duration::from_secs(1));
        assert!(WindowConfig::per_second(0).build(WindowKind::Fixed).is_err());
    }
}
