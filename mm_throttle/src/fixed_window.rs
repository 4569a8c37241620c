use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::Result;
use crate::time;
use crate::window::Window;
use crate::window::WindowConfig;
use crate::window::needs_hard_wait;
use crate::window::soft_delay;

/// Fixed window budget with hard resets at window boundaries
///
/// The window behaves as a single decrementing counter. Once `now` reaches the
/// reset deadline the counter returns to the limit and the next deadline is
/// scheduled from the observed `now` rather than the stale deadline, so an idle
/// window does not accumulate drift.
pub struct FixedWindow {
    config: WindowConfig,
    state: Mutex<FixedState>,
}

#[derive(Debug)]
struct FixedState {
    /// Capacity left in the current window
    remaining: i64,

    /// Instant the current window started
    window_start: Instant,

    /// Instant the current window rolls over
    next_reset: Instant,
}

impl FixedState {
    #[inline(always)]
    fn roll(&mut self, config: &WindowConfig, now: Instant) {
        if now >= self.next_reset {
            self.remaining = i64::from(config.limit);
            self.window_start = now;
            self.next_reset = now + config.window;
        }
    }
}

impl FixedWindow {
    /// Create a new fixed window starting now
    pub fn new(config: WindowConfig) -> Result<Self> {
        Self::starting_at(config, time::now())
    }

    /// Create a new fixed window whose first period starts at `start`
    pub fn starting_at(config: WindowConfig, start: Instant) -> Result<Self> {
        config.validate()?;

        let state = FixedState { remaining: i64::from(config.limit), window_start: start, next_reset: start + config.window };
        Ok(Self { config, state: Mutex::new(state) })
    }

    /// Instant at which the current window rolls over
    pub fn next_reset(&self) -> Instant {
        self.state.lock().next_reset
    }
}

impl Window for FixedWindow {
    fn config(&self) -> &WindowConfig {
        &self.config
    }

    fn can_send_at(&self, cost: u32, now: Instant) -> bool {
        let mut state = self.state.lock();
        state.roll(&self.config, now);
        state.remaining >= i64::from(cost)
    }

    fn consume_at(&self, cost: u32, now: Instant) -> Instant {
        let mut state = self.state.lock();
        state.roll(&self.config, now);
        state.remaining -= i64::from(cost);
        now
    }

    /// Credits `cost` back to the current window
    ///
    /// A consumption recorded before the current window started was already
    /// forgiven by the reset, so crediting it again would inflate the new
    /// window. Such refunds are ignored.
    fn refund_at(&self, consumed_at: Instant, cost: u32, now: Instant) {
        let mut state = self.state.lock();
        state.roll(&self.config, now);

        if consumed_at < state.window_start {
            return;
        }

        state.remaining = (state.remaining + i64::from(cost)).min(i64::from(self.config.limit));
    }

    fn wait_time_at(&self, cost: u32, now: Instant) -> Duration {
        if cost == 0 {
            return Duration::ZERO;
        }

        let mut state = self.state.lock();
        state.roll(&self.config, now);

        let time_left = time::until(state.next_reset, now);
        if needs_hard_wait(state.remaining, cost) {
            return time_left;
        }

        soft_delay(&self.config, state.remaining, cost, time_left)
    }

    fn remaining_at(&self, now: Instant) -> i64 {
        let mut state = self.state.lock();
        state.roll(&self.config, now);
        state.remaining
    }

    fn reset(&self) {
        let now = time::now();
        let mut state = self.state.lock();
        state.remaining = i64::from(self.config.limit);
        state.window_start = now;
        state.next_reset = now + self.config.window;
    }
}
