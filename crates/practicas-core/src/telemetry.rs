//! Tracing initialisation for practicas binaries.
//!
//! Call [`init_from_config`] once at program start. Later calls leave the
//! installed subscriber in place.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::CoreConfig;

/// Directives from `RUST_LOG` when set and valid, else the configured level,
/// else `info`.
fn filter(rust_log: Option<&str>, level: &str) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Install the global subscriber: human-readable lines, or newline-delimited
/// JSON when [`CoreConfig::log_json`] is set. Returns false if a subscriber
/// was already installed.
pub fn init_from_config(config: &CoreConfig) -> bool {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let json = config.log_json.then(|| fmt::layer().with_target(false).json());
    let text = (!config.log_json).then(|| fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(filter(rust_log.as_deref(), &config.log_level))
        .with(json)
        .with(text)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_wins_over_configured_level() {
        assert_eq!(filter(Some("debug"), "warn").to_string(), "debug");
        assert_eq!(filter(None, "warn").to_string(), "warn");
    }

    #[test]
    fn invalid_directives_fall_back() {
        assert_eq!(filter(Some("practicas=loud"), "warn").to_string(), "warn");
        assert_eq!(filter(None, "practicas=loud").to_string(), "info");
    }
}
