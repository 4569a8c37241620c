pub mod cli;
pub mod config_loader;
pub mod shutdown_handler;
pub mod sim;
pub mod tracing_setup;
