use std::io;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Initialise tracing on stdout, plus an hourly rolling file when `log_dir` is set
///
/// Respects `RUST_LOG`, falling back to `default_level`. The returned guard
/// must be held for the lifetime of the process to flush the file writer.
pub fn init(app_name: &str, log_dir: Option<&str>, default_level: Level) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy();

    let stdout_layer = fmt::layer().with_writer(io::stdout).with_target(true).with_line_number(true).with_ansi(true).compact();

    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry().with(env_filter).with(stdout_layer).init();
        return None;
    };

    let _ = std::fs::create_dir_all(log_dir);

    // Background thread handles all file I/O
    let file_appender = tracing_appender::rolling::hourly(log_dir, format!("{app_name}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer =
        fmt::layer().with_writer(non_blocking).with_target(true).with_thread_ids(true).with_line_number(true).with_ansi(false).compact();

    tracing_subscriber::registry().with(env_filter).with(stdout_layer).with(file_layer).init();

    Some(guard)
}
