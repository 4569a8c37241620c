use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// Clears `running` on Ctrl+C so simulator workers stop requesting admission
pub fn setup(running: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, draining workers");
        running.store(false, Ordering::Relaxed);
    })
}
