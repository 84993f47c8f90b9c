use std::str::FromStr;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::LogSettings;

/// Parse `log.level`, falling back to `info` for anything unrecognised.
pub fn parse_level(level: &str) -> Level {
    match level.trim().to_lowercase().as_str() {
        "warning" => Level::WARN,
        other => Level::from_str(other).unwrap_or(Level::INFO),
    }
}

/// Build the filter used by [`init`]. `RUST_LOG` directives, when present,
/// are layered over the configured default level.
pub fn env_filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(parse_level(&settings.level)).into())
        .from_env_lossy()
}

/// Initialize tracing for the process.
pub fn init(settings: &LogSettings) {
    // try_init: tests and the binary may both call this
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(settings))
        .with_target(false)
        .try_init();
}
