use std::time::Duration;

/// Command-line options for the throttle simulator
///
/// Positional: `[settings_path] [workers] [duration_secs]`. A settings path of
/// `-` selects the built-in Binance Spot preset.
#[derive(Debug, Clone, PartialEq)]
pub struct SimArgs {
    pub settings_path: Option<String>,
    pub workers: usize,
    pub duration: Duration,
}

impl Default for SimArgs {
    fn default() -> Self {
        Self { settings_path: None, workers: 8, duration: Duration::from_secs(30) }
    }
}

/// Parses the simulator options from the process arguments
pub fn get_sim_args() -> SimArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    parse_sim_args(&args)
}

/// Parses simulator options; malformed numbers fall back to the defaults
pub fn parse_sim_args(args: &[String]) -> SimArgs {
    let defaults = SimArgs::default();

    let settings_path = args.first().filter(|path| path.as_str() != "-").cloned();
    let workers = args.get(1).and_then(|w| w.parse::<usize>().ok()).filter(|&w| w > 0).unwrap_or(defaults.workers);
    let duration = args.get(2).and_then(|d| d.parse::<u64>().ok()).map(Duration::from_secs).unwrap_or(defaults.duration);

    SimArgs { settings_path, workers, duration }
}
