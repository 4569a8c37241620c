//! Pre-configured throttlers for major cryptocurrency exchanges
//!
//! Factory functions that build throttlers matching the published rate limits
//! of each exchange. Budgets are set slightly below the published values where
//! the exchange counts on its own clock.
//!
//! # Supported Exchanges
//!
//! - **Binance**: a weight budget shared by every category plus order budgets
//! - **Bybit**: public and private categories
//! - **Coinbase**: public and private categories
//! - **Kraken**: tiered private budgets

pub mod binance;
pub mod bybit;
pub mod coinbase;
pub mod kraken;
