//! Tracing initialization
//!
//! The engine itself only emits `tracing` events; the embedding shell calls
//! this once at startup to get structured log output. Safe to call more
//! than once; later calls are no-ops.

use tracing_subscriber::EnvFilter;

use greenscan_core::config::LoggingConfig;

/// Installs a global tracing subscriber honoring `RUST_LOG` overrides
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
