//! Binance exchange throttling presets
//!
//! Binance enforces multiple simultaneous rate limits:
//! - **REQUEST_WEIGHT**: weighted requests based on endpoint cost
//! - **ORDERS**: order placement limits per account
//!
//! Reference: https://binance-docs.github.io/apidocs/spot/en/#limits

use std::time::Duration;

use crate::CategorizedThrottler;
use crate::cost_table::CostTable;
use crate::cost_table::UnknownEndpointPolicy;
use crate::cost_table::Verb;
use crate::cost_table::param;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::window::WindowConfig;

pub const MARKET_DATA: &str = "market_data";
pub const ACCOUNT: &str = "account";
pub const ORDERS: &str = "orders";

/// Binance Spot API throttler
///
/// Pipelines:
/// - `request_weight`: 1_200 weight per minute, shared by every category
/// - `orders_10s`: 100 orders per 10 seconds
/// - `orders_day`: 200_000 orders per day
///
pub fn spot_throttler() -> Result<CategorizedThrottler> {
    spot_throttler_with_weight(1_200)
}

/// Binance Spot throttler with a custom weight budget per minute
pub fn spot_throttler_with_weight(weight_per_minute: u32) -> Result<CategorizedThrottler> {
    let all = [MARKET_DATA, ACCOUNT, ORDERS];

    CategorizedThrottler::builder()
        .with_shared_pipeline(
            &all,
            Pipeline::sliding(
                "request_weight",
                WindowConfig::per_minute(weight_per_minute).with_soft_threshold(0.2).with_max_soft_delay(Duration::from_millis(500)),
            )?
            .with_event_threshold(0.25)?,
        )
        .with_pipeline(ORDERS, Pipeline::fixed("orders_10s", WindowConfig::new(100, Duration::from_secs(10)))?.with_event_threshold(0.2)?)
        .with_pipeline(ORDERS, Pipeline::fixed("orders_day", WindowConfig::per_day(200_000))?)
        .with_costs(spot_costs()?)
        .build()
}

/// Endpoint weights for the Spot REST API
pub fn spot_costs() -> Result<CostTable> {
    CostTable::new(UnknownEndpointPolicy::Reject)
        .with_endpoint(Verb::Get, "/api/v3/ping", 1, MARKET_DATA)
        .with_endpoint(Verb::Get, "/api/v3/time", 1, MARKET_DATA)
        .with_endpoint(Verb::Get, "/api/v3/exchangeInfo", 20, MARKET_DATA)
        .with_endpoint(Verb::Get, "/api/v3/depth", 5, MARKET_DATA)
        .with_endpoint(Verb::Get, "/api/v3/trades", 25, MARKET_DATA)
        .with_endpoint(Verb::Get, "/api/v3/klines", 2, MARKET_DATA)
        .with_endpoint(Verb::Get, "/api/v3/avgPrice", 2, MARKET_DATA)
        .with_endpoint(Verb::Get, "/api/v3/ticker/24hr", 2, MARKET_DATA)
        .with_endpoint(Verb::Get, "/api/v3/account", 20, ACCOUNT)
        .with_endpoint(Verb::Get, "/api/v3/openOrders", 6, ACCOUNT)
        .with_endpoint(Verb::Get, "/api/v3/myTrades", 20, ACCOUNT)
        .with_endpoint(Verb::Post, "/api/v3/order", 1, ORDERS)
        .with_endpoint(Verb::Delete, "/api/v3/order", 1, ORDERS)
        .with_endpoint(Verb::Delete, "/api/v3/openOrders", 1, ORDERS)
        .with_override(Verb::Get, "/api/v3/depth", depth_weight)?
        .with_override(Verb::Get, "/api/v3/ticker/24hr", ticker_weight)
}

/// Order book depth weight, driven by the `limit` parameter
pub fn depth_weight(params: &[(&str, &str)]) -> u32 {
    let limit = param(params, "limit").and_then(|l| l.parse::<u32>().ok()).unwrap_or(100);
    match limit {
        0..=100 => 5,
        101..=500 => 25,
        501..=1_000 => 50,
        _ => 250,
    }
}

/// 24h ticker weight: one symbol is cheap, all symbols are expensive
pub fn ticker_weight(params: &[(&str, &str)]) -> u32 {
    if param(params, "symbol").is_some() {
        2
    } else {
        80
    }
}
