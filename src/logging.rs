//! Diagnostic logging setup.
//!
//! Library code only emits `tracing` events; binaries call [`init_logging`]
//! once to route them to stderr.

use tracing_subscriber::EnvFilter;

/// Installs a stderr fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `fallback_filter` (normally
/// [`crate::SessionConfig::log_filter`]) applies. Returns false when a global
/// subscriber was already installed.
pub fn init_logging(fallback_filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter_from_env(fallback_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}

fn filter_from_env(fallback_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_filter))
        .unwrap_or_else(|_| EnvFilter::new(crate::config::DEFAULT_LOG_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_initialization_reports_existing_subscriber() {
        let _ = init_logging("warn");
        assert!(!init_logging("debug"));
    }
}
