use thiserror::Error;

/// Result type for throttling operations
pub type Result<T> = std::result::Result<T, ThrottleError>;

/// Errors raised while building or driving a throttler
///
/// There is no "rate limited" variant: admission always succeeds eventually by
/// waiting, so every variant here is a configuration problem.
#[derive(Error, Debug)]
pub enum ThrottleError {
    #[error("Invalid throttler configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown endpoint: {verb} {resource}")]
    UnknownEndpoint { verb: String, resource: String },

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Cost {cost} exceeds capacity {limit} of pipeline '{label}'")]
    CostExceedsCapacity { label: String, cost: u32, limit: u32 },

    #[error("Failed to load settings: {0}")]
    Settings(#[from] config::ConfigError),
}
