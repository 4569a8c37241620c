use std::path::Path;

use config::Config;
use config::File;
use config::FileFormat;
use serde::Deserialize;

use crate::categorized::CategorizedThrottler;
use crate::cost_table::CostTable;
use crate::cost_table::UnknownEndpointPolicy;
use crate::cost_table::Verb;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::throttler::Throttler;
use crate::time;
use crate::window::WindowConfig;
use crate::window::WindowKind;

/// Throttler layout as read from a configuration file
///
/// ```toml
/// [[pipelines]]
/// label = "weight"
/// kind = "sliding"
/// capacity = 1200
/// window_ms = 60000
/// soft_threshold = 0.2
/// event_threshold = 0.25
/// categories = ["market_data", "orders"]
///
/// [[endpoints]]
/// verb = "GET"
/// resource = "/api/v3/depth"
/// cost = 5
/// category = "market_data"
///
/// [unknown_endpoint]
/// policy = "reject"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ThrottlerSettings {
    pub pipelines: Vec<PipelineSettings>,

    #[serde(default)]
    pub endpoints: Vec<EndpointSettings>,

    #[serde(default)]
    pub unknown_endpoint: UnknownEndpointPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    pub label: String,

    #[serde(default)]
    pub kind: WindowKind,

    /// Capacity units per window
    pub capacity: u32,

    pub window_ms: u64,

    pub max_soft_delay_ms: Option<u64>,

    #[serde(default)]
    pub soft_threshold: f64,

    pub event_threshold: Option<f64>,

    /// Categories this pipeline governs; ignored by flat throttlers
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointSettings {
    pub verb: Verb,
    pub resource: String,
    pub cost: u32,
    pub category: String,
}

impl PipelineSettings {
    pub fn window_config(&self) -> WindowConfig {
        let config = WindowConfig::new(self.capacity, time::millis(self.window_ms)).with_soft_threshold(self.soft_threshold);
        match self.max_soft_delay_ms {
            Some(ms) => config.with_max_soft_delay(time::millis(ms)),
            None => config,
        }
    }

    pub fn build(&self) -> Result<Pipeline> {
        let pipeline = Pipeline::with_config(self.label.as_str(), self.kind, self.window_config())?;
        match self.event_threshold {
            Some(threshold) => pipeline.with_event_threshold(threshold),
            None => Ok(pipeline),
        }
    }
}

impl ThrottlerSettings {
    /// Load settings from a file; the format is inferred from the extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder().add_source(File::from(path.as_ref())).build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = Config::builder().add_source(File::from_str(toml, FileFormat::Toml)).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Build a flat throttler over every pipeline, ignoring categories
    pub fn build_throttler(&self) -> Result<Throttler> {
        let pipelines = self.pipelines.iter().map(PipelineSettings::build).collect::<Result<Vec<_>>>()?;
        Throttler::new(pipelines)
    }

    pub fn cost_table(&self) -> CostTable {
        let mut costs = CostTable::new(self.unknown_endpoint.clone());
        for endpoint in &self.endpoints {
            costs.insert(endpoint.verb, endpoint.resource.as_str(), endpoint.cost, &endpoint.category);
        }
        costs
    }

    pub fn build_categorized(&self) -> Result<CategorizedThrottler> {
        let mut builder = CategorizedThrottler::builder();
        for settings in &self.pipelines {
            let categories: Vec<&str> = settings.categories.iter().map(String::as_str).collect();
            builder = builder.with_shared_pipeline(&categories, settings.build()?);
        }
        builder.with_costs(self.cost_table()).build()
    }
}
