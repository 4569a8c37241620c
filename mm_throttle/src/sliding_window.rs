use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::Result;
use crate::time;
use crate::window::Window;
use crate::window::WindowConfig;
use crate::window::needs_hard_wait;
use crate::window::soft_delay;

/// Sliding window budget where every consumption expires on its own
///
/// Consumptions are kept in a chronologically ordered history. An entry stops
/// counting against the budget once `instant + window <= now`; expired entries
/// are purged from the front before every observation, so at any point
/// `remaining + sum(unexpired costs) == limit`.
pub struct SlidingWindow {
    config: WindowConfig,
    state: Mutex<SlidingState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Consumption {
    at: Instant,
    cost: u32,
}

#[derive(Debug)]
struct SlidingState {
    remaining: i64,
    history: VecDeque<Consumption>,
}

impl SlidingState {
    #[inline(always)]
    fn purge(&mut self, window: Duration, now: Instant) {
        while let Some(front) = self.history.front() {
            if front.at + window > now {
                break;
            }
            self.remaining += i64::from(front.cost);
            self.history.pop_front();
        }
    }

    /// Instant at which enough entries have expired to cover `cost`
    fn frees_at(&self, cost: u32, window: Duration, now: Instant) -> Instant {
        let mut available = self.remaining;
        for entry in &self.history {
            available += i64::from(entry.cost);
            if available > 0 && available >= i64::from(cost) {
                return entry.at + window;
            }
        }

        // Only reachable while consumptions outran the limit; a full window
        // from now is an upper bound.
        now + window
    }
}

impl SlidingWindow {
    pub fn new(config: WindowConfig) -> Result<Self> {
        config.validate()?;

        let state = SlidingState { remaining: i64::from(config.limit), history: VecDeque::new() };
        Ok(Self { config, state: Mutex::new(state) })
    }

    /// Sum of costs that have not expired at `now`
    pub fn in_flight_at(&self, now: Instant) -> u64 {
        let mut state = self.state.lock();
        state.purge(self.config.window, now);
        state.history.iter().map(|c| u64::from(c.cost)).sum()
    }

    /// Number of unexpired consumptions at `now`
    pub fn history_len_at(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        state.purge(self.config.window, now);
        state.history.len()
    }
}

impl Window for SlidingWindow {
    fn config(&self) -> &WindowConfig {
        &self.config
    }

    fn can_send_at(&self, cost: u32, now: Instant) -> bool {
        let mut state = self.state.lock();
        state.purge(self.config.window, now);
        state.remaining >= i64::from(cost)
    }

    fn consume_at(&self, cost: u32, now: Instant) -> Instant {
        let mut state = self.state.lock();
        state.purge(self.config.window, now);
        state.remaining -= i64::from(cost);

        // Keep the history ordered even if a caller hands in an older instant
        let at = state.history.back().map_or(now, |last| now.max(last.at));
        state.history.push_back(Consumption { at, cost });
        at
    }

    /// Removes the matching consumption and credits its cost
    ///
    /// Entries that already expired were credited by the purge, so a refund
    /// that finds no match is a no-op.
    fn refund_at(&self, consumed_at: Instant, cost: u32, now: Instant) {
        let mut state = self.state.lock();
        state.purge(self.config.window, now);

        let position = state.history.iter().position(|c| c.cost == cost && time::approx_eq(c.at, consumed_at, time::REFUND_MATCH_TOLERANCE));
        if let Some(index) = position {
            state.history.remove(index);
            state.remaining += i64::from(cost);
        }
    }

    fn wait_time_at(&self, cost: u32, now: Instant) -> Duration {
        if cost == 0 {
            return Duration::ZERO;
        }

        let mut state = self.state.lock();
        state.purge(self.config.window, now);

        if needs_hard_wait(state.remaining, cost) {
            return time::until(state.frees_at(cost, self.config.window, now), now);
        }

        let time_left = state.history.front().map_or(self.config.window, |oldest| time::until(oldest.at + self.config.window, now));
        soft_delay(&self.config, state.remaining, cost, time_left)
    }

    fn remaining_at(&self, now: Instant) -> i64 {
        let mut state = self.state.lock();
        state.purge(self.config.window, now);
        state.remaining
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        state.history.clear();
        state.remaining = i64::from(self.config.limit);
    }
}
