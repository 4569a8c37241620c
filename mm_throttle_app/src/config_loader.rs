use mm_throttle::CategorizedThrottler;
use mm_throttle::Result;
use mm_throttle::ThrottlerSettings;
use mm_throttle::Verb;
use mm_throttle::exchanges::binance;

/// A request the simulator replays against the throttler
#[derive(Debug, Clone, PartialEq)]
pub struct SimEndpoint {
    pub verb: Verb,
    pub resource: String,
    pub params: Vec<(String, String)>,
}

impl SimEndpoint {
    pub fn new(verb: Verb, resource: &str) -> Self {
        Self { verb, resource: resource.to_string(), params: Vec::new() }
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self
    }
}

/// Throttler plus the request mix to drive through it
pub struct SimSetup {
    pub source: String,
    pub throttler: CategorizedThrottler,
    pub endpoints: Vec<SimEndpoint>,
}

/// Build a simulation from a settings file
pub fn load_sim_setup(path: &str) -> Result<SimSetup> {
    let settings = ThrottlerSettings::load(path)?;
    let throttler = settings.build_categorized()?;
    let endpoints = settings.endpoints.iter().map(|e| SimEndpoint::new(e.verb, &e.resource)).collect();

    Ok(SimSetup { source: path.to_string(), throttler, endpoints })
}

/// Binance Spot preset with a mixed market data, account and order workload
pub fn binance_sim_setup() -> Result<SimSetup> {
    let endpoints = vec![
        SimEndpoint::new(Verb::Get, "/api/v3/depth").with_param("symbol", "BTCUSDT").with_param("limit", "100"),
        SimEndpoint::new(Verb::Get, "/api/v3/ticker/24hr").with_param("symbol", "BTCUSDT"),
        SimEndpoint::new(Verb::Get, "/api/v3/trades").with_param("symbol", "BTCUSDT"),
        SimEndpoint::new(Verb::Post, "/api/v3/order"),
        SimEndpoint::new(Verb::Delete, "/api/v3/order"),
        SimEndpoint::new(Verb::Get, "/api/v3/openOrders").with_param("symbol", "BTCUSDT"),
    ];

    Ok(SimSetup { source: "binance spot preset".to_string(), throttler: binance::spot_throttler()?, endpoints })
}

/// Load the simulation from `path`, falling back to the Binance preset
pub fn load_sim_setup_or_default(path: Option<&str>) -> Result<SimSetup> {
    let Some(path) = path else {
        return binance_sim_setup();
    };

    match load_sim_setup(path) {
        Ok(setup) if !setup.endpoints.is_empty() => {
            tracing::info!("Loaded throttle settings from {path}");
            Ok(setup)
        }
        Ok(_) => {
            tracing::warn!("No endpoints defined in {path}. Using Binance preset.");
            binance_sim_setup()
        }
        Err(err) => {
            tracing::warn!("Failed to load throttle settings from {}: {}. Using Binance preset.", path, err);
            binance_sim_setup()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_endpoints_resolve() {
        let setup = binance_sim_setup().unwrap();

        for endpoint in &setup.endpoints {
            let params: Vec<(&str, &str)> = endpoint.params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            assert!(setup.throttler.resolve(endpoint.verb, &endpoint.resource, &params).is_ok(), "{endpoint:?}");
        }
    }

    #[test]
    fn test_missing_file_falls_back() {
        let setup = load_sim_setup_or_default(Some("/nonexistent/throttle.toml")).unwrap();

        assert_eq!(setup.source, "binance spot preset");
        assert!(setup.throttler.pipeline("request_weight").is_some());
    }

    #[test]
    fn test_no_path_uses_preset() {
        let setup = load_sim_setup_or_default(None).unwrap();
        assert_eq!(setup.endpoints.len(), 6);
    }
}
