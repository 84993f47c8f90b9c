use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub distribution: DistributionSettings,
    pub storage: StorageSettings,
    pub log: LogSettings,
}

/// Defines the host and port the WebSocket server will bind to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Queue sizes, worker count and reclamation intervals of the distribution
/// core.
#[derive(Debug, Deserialize, Clone)]
pub struct DistributionSettings {
    pub workers: usize,
    pub ingress_capacity: usize,
    pub chat_queue_capacity: usize,
    pub connection_queue_capacity: usize,
    pub ingress_timeout_ms: u64,
    pub empty_topic_gc_secs: u64,
    pub stalled_listener_gc_secs: u64,
    pub history_preview_len: usize,
}

impl DistributionSettings {
    pub fn ingress_timeout(&self) -> Duration {
        Duration::from_millis(self.ingress_timeout_ms)
    }

    pub fn empty_topic_gc_interval(&self) -> Duration {
        Duration::from_secs(self.empty_topic_gc_secs.max(1))
    }

    pub fn stalled_listener_gc_interval(&self) -> Duration {
        Duration::from_secs(self.stalled_listener_gc_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub path: String,
    pub file_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub distribution: Option<PartialDistributionSettings>,
    pub storage: Option<PartialStorageSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialDistributionSettings {
    pub workers: Option<usize>,
    pub ingress_capacity: Option<usize>,
    pub chat_queue_capacity: Option<usize>,
    pub connection_queue_capacity: Option<usize>,
    pub ingress_timeout_ms: Option<u64>,
    pub empty_topic_gc_secs: Option<u64>,
    pub stalled_listener_gc_secs: Option<u64>,
    pub history_preview_len: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialStorageSettings {
    pub path: Option<String>,
    pub file_base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            distribution: DistributionSettings::default(),
            storage: StorageSettings {
                path: "chatcast_db".to_string(),
                file_base_url: "http://127.0.0.1:8080/files".to_string(),
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for DistributionSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            ingress_capacity: 1024,
            chat_queue_capacity: 16,
            connection_queue_capacity: 128,
            ingress_timeout_ms: 5_000,
            empty_topic_gc_secs: 300,
            stalled_listener_gc_secs: 120,
            history_preview_len: 20,
        }
    }
}
