//! Tracing initialization for embedding applications

use driftsync_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber
///
/// `RUST_LOG` takes precedence; otherwise the configured level applies to
/// every target. Does nothing if a subscriber is already installed, so
/// embedders and tests can call it unconditionally.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
