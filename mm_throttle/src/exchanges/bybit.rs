//! Bybit exchange throttling presets
//!
//! Bybit enforces different rate limits based on endpoint type and account level.
//!
//! Reference: https://bybit-exchange.github.io/docs/v5/rate-limit

use crate::CategorizedThrottler;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::window::WindowConfig;

pub const PUBLIC: &str = "public";
pub const PRIVATE: &str = "private";

/// Bybit throttler for default accounts
///
/// - public: 120 requests per minute, 10 per second burst
/// - private: 120 requests per minute, 10 per second burst
pub fn throttler() -> Result<CategorizedThrottler> {
    with_private_limits(120, 10)
}

/// Bybit throttler for VIP accounts
///
/// - private: 600 requests per minute, 50 per second burst
pub fn throttler_vip() -> Result<CategorizedThrottler> {
    with_private_limits(600, 50)
}

/// Conservative Bybit limits
///
/// - public: 100 requests per minute (83% of limit), 8 per second
pub fn throttler_conservative() -> Result<CategorizedThrottler> {
    build(100, 8, 100, 8)
}

fn with_private_limits(per_minute: u32, per_second: u32) -> Result<CategorizedThrottler> {
    build(120, 10, per_minute, per_second)
}

fn build(public_minute: u32, public_second: u32, private_minute: u32, private_second: u32) -> Result<CategorizedThrottler> {
    CategorizedThrottler::builder()
        .with_pipeline(PUBLIC, Pipeline::sliding("public_minute", WindowConfig::per_minute(public_minute))?)
        .with_pipeline(PUBLIC, Pipeline::fixed("public_second", WindowConfig::per_second(public_second))?)
        .with_pipeline(PRIVATE, Pipeline::sliding("private_minute", WindowConfig::per_minute(private_minute))?.with_event_threshold(0.2)?)
        .with_pipeline(PRIVATE, Pipeline::fixed("private_second", WindowConfig::per_second(private_second))?)
        .build()
}
