pub mod categorized;
pub mod cost_table;
pub mod error;
pub mod events;
pub mod exchanges;
pub mod fixed_window;
pub mod pipeline;
pub mod settings;
pub mod sliding_window;
pub mod throttler;
mod time;
pub mod window;

pub use categorized::CategorizedThrottler;
pub use categorized::CategorizedThrottlerBuilder;
pub use cost_table::CostTable;
pub use cost_table::ResolvedCost;
pub use cost_table::UnknownEndpointPolicy;
pub use cost_table::Verb;
pub use error::Result;
pub use error::ThrottleError;
pub use events::EventListeners;
pub use events::ListenerId;
pub use events::ThrottleEvent;
pub use fixed_window::FixedWindow;
pub use pipeline::Pipeline;
pub use settings::ThrottlerSettings;
pub use sliding_window::SlidingWindow;
pub use throttler::Admission;
pub use throttler::Throttler;
pub use throttler::ThrottlerBuilder;
pub use window::Window;
pub use window::WindowConfig;
pub use window::WindowKind;
