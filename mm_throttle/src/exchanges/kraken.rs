//! Kraken exchange throttling presets
//!
//! Kraken uses a tiered counter: each call adds to the counter and the counter
//! decays over time at a tier-dependent rate. A sliding window of `capacity`
//! units over `capacity / decay_rate` seconds approximates it.
//!
//! Reference: https://docs.kraken.com/rest/#section/Rate-Limits

use std::time::Duration;

use crate::Throttler;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::window::WindowConfig;

/// Kraken verification tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Counter max 15, decays 0.33 per second
    Starter,
    /// Counter max 20, decays 0.5 per second
    Intermediate,
    /// Counter max 20, decays 1 per second
    Pro,
}

impl Tier {
    pub fn capacity(self) -> u32 {
        match self {
            Tier::Starter => 15,
            Tier::Intermediate | Tier::Pro => 20,
        }
    }

    pub fn decay_per_second(self) -> f64 {
        match self {
            Tier::Starter => 0.33,
            Tier::Intermediate => 0.5,
            Tier::Pro => 1.0,
        }
    }

    /// Window over which a full counter drains
    pub fn window(self) -> Duration {
        Duration::from_secs_f64(f64::from(self.capacity()) / self.decay_per_second())
    }
}

/// Kraken public API throttler
///
/// - 1 request per second baseline, burst up to 15
pub fn public_throttler() -> Result<Throttler> {
    Throttler::builder()
        .with_pipeline(Pipeline::sliding("public", WindowConfig::new(15, Duration::from_secs(15)).with_soft_threshold(0.3))?)
        .build()
}

/// Kraken private API throttler for `tier`
///
/// Different endpoints cost different amounts (1-4 points); callers pass the
/// endpoint's points as the cost.
pub fn private_throttler(tier: Tier) -> Result<Throttler> {
    let config = WindowConfig::new(tier.capacity(), tier.window()).with_soft_threshold(0.25).with_max_soft_delay(Duration::from_secs(3));

    Throttler::builder().with_pipeline(Pipeline::sliding("private", config)?.with_event_threshold(0.2)?).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_throttler() {
        let throttler = public_throttler().unwrap();
        assert_eq!(throttler.pipeline("public").unwrap().window().limit(), 15);
    }

    #[test]
    fn test_tiers() {
        assert_eq!(Tier::Starter.capacity(), 15);
        assert_eq!(Tier::Intermediate.window(), Duration::from_secs(40));
        assert_eq!(Tier::Pro.window(), Duration::from_secs(20));

        let starter = private_throttler(Tier::Starter).unwrap();
        assert_eq!(starter.pipeline("private").unwrap().window().limit(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_private_points() {
        let throttler = private_throttler(Tier::Pro).unwrap();

        throttler.check_and_wait(4).await.unwrap();
        throttler.check_and_wait(2).await.unwrap();
        assert_eq!(throttler.pipeline("private").unwrap().window().remaining(), 14);
    }
}
