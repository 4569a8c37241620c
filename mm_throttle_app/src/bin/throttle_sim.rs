use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use mm_throttle_app::cli;
use mm_throttle_app::config_loader;
use mm_throttle_app::shutdown_handler;
use mm_throttle_app::sim;
use mm_throttle_app::sim::SimConfig;
use mm_throttle_app::tracing_setup;
use tracing::Level;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = std::env::var("THROTTLE_SIM_LOG_DIR").ok();
    let _guard = tracing_setup::init("throttle_sim", log_dir.as_deref(), Level::INFO);

    let args = cli::get_sim_args();
    let setup = config_loader::load_sim_setup_or_default(args.settings_path.as_deref())?;

    info!(
        source = %setup.source,
        workers = args.workers,
        duration_secs = args.duration.as_secs(),
        endpoints = setup.endpoints.len(),
        "Starting throttle simulation"
    );
    for category in setup.throttler.categories() {
        let labels: Vec<&str> = setup.throttler.pipelines(category)?.iter().map(|p| p.label()).collect();
        info!(category, pipelines = ?labels, "Category layout");
    }

    let running = Arc::new(AtomicBool::new(true));
    shutdown_handler::setup(Arc::clone(&running))?;

    let config = SimConfig { workers: args.workers, duration: args.duration, ..SimConfig::default() };
    let report = sim::run(Arc::new(setup.throttler), Arc::from(setup.endpoints), config, running).await;

    info!(
        admitted = report.admitted,
        refunded = report.refunded,
        rejected = report.rejected,
        events = report.events,
        total_cost = report.total_cost,
        mean_wait_ms = report.mean_wait().as_millis() as u64,
        max_wait_ms = report.max_wait.as_millis() as u64,
        "Simulation finished"
    );

    Ok(())
}
