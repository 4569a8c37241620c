//! Coinbase exchange throttling presets
//!
//! Coinbase enforces different rate limits for public and private endpoints.
//!
//! Reference: https://docs.cloud.coinbase.com/exchange/docs/rate-limits

use crate::CategorizedThrottler;
use crate::Throttler;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::window::WindowConfig;

pub const PUBLIC: &str = "public";
pub const PRIVATE: &str = "private";

/// Coinbase throttler with public and private categories
///
/// - public endpoints (market data): 10 requests per second
/// - private endpoints (trading, account): 15 requests per second
///
/// # Example
/// ```
/// use mm_throttle::exchanges::coinbase;
///
/// # async fn run() -> mm_throttle::Result<()> {
/// let throttler = coinbase::throttler()?;
///
/// let admission = throttler.check_and_wait(1, coinbase::PUBLIC).await?;
/// // Make public API request, refund if it failed
/// # let failed = false;
/// if failed {
///     throttler.refund(&admission);
/// }
/// # Ok(())
/// # }
/// ```
pub fn throttler() -> Result<CategorizedThrottler> {
    build(10, 15)
}

/// Conservative Coinbase limits (safe for all accounts)
///
/// - 8 requests per second for public
/// - 12 requests per second for private
pub fn throttler_conservative() -> Result<CategorizedThrottler> {
    build(8, 12)
}

/// Coinbase Advanced Trade API limits
///
/// - 30 requests per second for retail
pub fn advanced_trade_throttler() -> Result<Throttler> {
    Throttler::builder().with_pipeline(Pipeline::sliding("advanced_trade", WindowConfig::per_second(30))?).build()
}

fn build(public_per_second: u32, private_per_second: u32) -> Result<CategorizedThrottler> {
    CategorizedThrottler::builder()
        .with_pipeline(PUBLIC, Pipeline::sliding("public", WindowConfig::per_second(public_per_second))?)
        .with_pipeline(PRIVATE, Pipeline::sliding("private", WindowConfig::per_second(private_per_second))?)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits() {
        let throttler = throttler().unwrap();
        assert_eq!(throttler.pipeline("public").unwrap().window().limit(), 10);
        assert_eq!(throttler.pipeline("private").unwrap().window().limit(), 15);
    }

    #[test]
    fn test_conservative_limits() {
        let throttler = throttler_conservative().unwrap();
        assert_eq!(throttler.pipeline("public").unwrap().window().limit(), 8);
        assert_eq!(throttler.pipeline("private").unwrap().window().limit(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_advanced_trade_limits() {
        let throttler = advanced_trade_throttler().unwrap();

        throttler.check_and_wait(30).await.unwrap();
        assert_eq!(throttler.wait_time(1), std::time::Duration::from_secs(1));
    }
}
