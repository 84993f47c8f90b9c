mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{
    DistributionSettings, LogSettings, ServerSettings, Settings, StorageSettings,
};

/// Loads the configuration from `config/default` and `CHATCAST__*`
/// environment variables, merged over `Settings::default()`.
///
/// Nested keys use a double underscore, e.g.
/// `CHATCAST__DISTRIBUTION__CHAT_QUEUE_CAPACITY=32`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("CHATCAST")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let default = Settings::default();

    let server = partial.server.as_ref();
    let dist = partial.distribution.as_ref();
    let storage = partial.storage.as_ref();
    let d = default.distribution;

    Ok(Settings {
        server: ServerSettings {
            host: server
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: server.and_then(|s| s.port).unwrap_or(default.server.port),
        },
        distribution: DistributionSettings {
            workers: dist
                .and_then(|b| b.workers)
                .unwrap_or(d.workers)
                .max(1),
            ingress_capacity: dist
                .and_then(|b| b.ingress_capacity)
                .unwrap_or(d.ingress_capacity),
            chat_queue_capacity: dist
                .and_then(|b| b.chat_queue_capacity)
                .unwrap_or(d.chat_queue_capacity),
            connection_queue_capacity: dist
                .and_then(|b| b.connection_queue_capacity)
                .unwrap_or(d.connection_queue_capacity),
            ingress_timeout_ms: dist
                .and_then(|b| b.ingress_timeout_ms)
                .unwrap_or(d.ingress_timeout_ms),
            empty_topic_gc_secs: dist
                .and_then(|b| b.empty_topic_gc_secs)
                .unwrap_or(d.empty_topic_gc_secs),
            stalled_listener_gc_secs: dist
                .and_then(|b| b.stalled_listener_gc_secs)
                .unwrap_or(d.stalled_listener_gc_secs),
            history_preview_len: dist
                .and_then(|b| b.history_preview_len)
                .unwrap_or(d.history_preview_len),
        },
        storage: StorageSettings {
            path: storage
                .and_then(|s| s.path.clone())
                .unwrap_or(default.storage.path),
            file_base_url: storage
                .and_then(|s| s.file_base_url.clone())
                .unwrap_or(default.storage.file_base_url),
        },
        log: LogSettings {
            level: partial
                .log
                .and_then(|l| l.level)
                .unwrap_or(default.log.level),
        },
    })
}

#[cfg(test)]
mod tests;
