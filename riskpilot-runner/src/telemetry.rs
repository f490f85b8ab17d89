//! Tracing subscriber setup for binaries.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! caller's decision.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "riskpilot_core=info,riskpilot_runner=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global subscriber. `RUST_LOG` overrides `level` when set.
///
/// Returns `false` if a subscriber was already installed.
pub fn init(level: Option<&str>, format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match level {
        Some(level) => EnvFilter::new(format!(
            "riskpilot_core={level},riskpilot_runner={level}"
        )),
        None => EnvFilter::new(DEFAULT_FILTER),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match format {
        LogFormat::Text => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}
