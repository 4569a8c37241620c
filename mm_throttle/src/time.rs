use std::time::Duration;

use tokio::time::Instant;

/// Tolerance used when matching a refund against a recorded consumption
pub(crate) const REFUND_MATCH_TOLERANCE: Duration = Duration::from_micros(1);

/// Current instant on the tokio clock
///
/// Reads the paused clock under `tokio::time::pause`, which keeps windows
/// deterministic in tests.
#[inline(always)]
pub(crate) fn now() -> Instant {
    Instant::now()
}

/// Time left until `deadline`, zero if it already passed
#[inline(always)]
pub(crate) fn until(deadline: Instant, now: Instant) -> Duration {
    deadline.saturating_duration_since(now)
}

/// Whether two instants are within `tolerance` of each other
#[inline(always)]
pub(crate) fn approx_eq(a: Instant, b: Instant, tolerance: Duration) -> bool {
    let diff = if a >= b { a - b } else { b - a };
    diff <= tolerance
}

/// Convert milliseconds to a duration
#[inline(always)]
pub(crate) const fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
