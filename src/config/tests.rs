use super::load_config;
use super::settings::Settings;
use serial_test::serial;
use std::env;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.distribution.workers, 1);
    assert_eq!(settings.distribution.chat_queue_capacity, 16);
    assert_eq!(settings.distribution.ingress_timeout(), Duration::from_secs(5));
    assert_eq!(
        settings.distribution.empty_topic_gc_interval(),
        Duration::from_secs(300)
    );
    assert_eq!(
        settings.distribution.stalled_listener_gc_interval(),
        Duration::from_secs(120)
    );
    assert_eq!(settings.log.level, "info");
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 9000

        [distribution]
        workers = 0
        chat_queue_capacity = 4
        ingress_timeout_ms = 250
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();

    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9000);
    // clamped to at least one worker
    assert_eq!(cfg.distribution.workers, 1);
    assert_eq!(cfg.distribution.chat_queue_capacity, 4);
    assert_eq!(cfg.distribution.ingress_timeout_ms, 250);
    assert_eq!(cfg.distribution.connection_queue_capacity, 128);
    assert_eq!(cfg.storage.path, "chatcast_db");
}

#[test]
#[serial]
fn load_config_from_env_overrides_defaults() {
    temp_env::with_vars(
        [
            ("CHATCAST__SERVER__PORT", Some("9100")),
            ("CHATCAST__DISTRIBUTION__CONNECTION_QUEUE_CAPACITY", Some("64")),
            ("CHATCAST__LOG__LEVEL", Some("debug")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.server.port, 9100);
            assert_eq!(cfg.distribution.connection_queue_capacity, 64);
            assert_eq!(cfg.log.level, "debug");
            assert_eq!(cfg.server.host, "127.0.0.1");
        },
    );
}

#[test]
#[serial]
fn load_config_reports_malformed_values() {
    temp_env::with_var("CHATCAST__SERVER__PORT", Some("not-a-port"), || {
        assert!(load_config().is_err());
    });
}
