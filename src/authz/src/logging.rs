//! Tracing subscriber bootstrap

use tracing_subscriber::EnvFilter;

/// Install a formatted tracing subscriber
///
/// `RUST_LOG` takes precedence over `default_level`. Returns `false` when a
/// global subscriber was already installed.
pub fn init_tracing(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
