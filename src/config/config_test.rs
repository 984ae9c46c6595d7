use serial_test::serial;
use temp_env::with_vars;

use super::*;
use crate::Error;

fn cleanup_all_topology_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("TOPOLOGY__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_settings_should_initialize_with_hardcoded_values() {
    let settings = Settings::default();

    assert_eq!(settings.node.advertise_uri, "localhost:3301");
    assert_eq!(settings.network.stage_timeout_ms, 3000);
    assert_eq!(settings.failover.suspect_threshold, 3);
    assert!(!settings.auth.enabled);
    assert_eq!(settings.sharding.groups["default"].bucket_count, 3000);
    assert!(settings.validate().is_ok());
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_topology_env_vars();
    with_vars(
        vec![
            ("TOPOLOGY__NODE__ADVERTISE_URI", Some("localhost:3302")),
            ("TOPOLOGY__AUTH__ENABLED", Some("true")),
            ("TOPOLOGY__NETWORK__PING_TIMEOUT_MS", Some("250")),
        ],
        || {
            let settings = Settings::new().unwrap();

            assert_eq!(settings.node.advertise_uri, "localhost:3302");
            assert!(settings.auth.enabled);
            assert_eq!(settings.network.ping_timeout_ms, 250);
        },
    );
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_topology_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("node.toml");

    std::fs::write(
        &config_path,
        r#"
        [node]
        workdir = "/tmp/xx/topology"
        alias = "router-1"

        [failover]
        suspect_threshold = 5
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base = Settings::new().expect("success");
        let settings = base.with_override_config(config_path.to_str().unwrap()).unwrap();

        assert_eq!(settings.node.workdir.to_str(), Some("/tmp/xx/topology"));
        assert_eq!(settings.node.alias, "router-1");
        assert_eq!(settings.failover.suspect_threshold, 5);
        // untouched sections keep their defaults
        assert_eq!(settings.network.commit_timeout_ms, 3000);
    });
}

#[test]
#[serial]
fn config_path_file_should_be_loaded() {
    cleanup_all_topology_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("cluster.toml");
    std::fs::write(
        &config_path,
        r#"
        [sharding.groups.hot]
        bucket_count = 2000
        "#,
    )
    .unwrap();

    with_vars(vec![("CONFIG_PATH", Some(config_path.to_str().unwrap()))], || {
        let settings = Settings::new().unwrap();
        assert_eq!(settings.sharding.groups["hot"].bucket_count, 2000);
    });
}

#[test]
fn validation_should_reject_bad_advertise_uri() {
    let mut settings = Settings::default();
    settings.node.advertise_uri = "localhost".to_string();

    let err = settings.validate().unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("node.advertise_uri must be host:port"));
}

#[test]
fn validation_should_reject_zero_timeouts() {
    let mut settings = Settings::default();
    settings.network.stage_timeout_ms = 0;

    let err = settings.validate().unwrap_err();
    assert!(err.to_string().contains("network.stage_timeout_ms must be positive"));
}

#[test]
fn validation_should_reject_renew_age_above_max_age() {
    let mut settings = Settings::default();
    settings.auth.cookie_max_age = 10;
    settings.auth.cookie_renew_age = 20;

    assert!(settings.validate().is_err());
}

#[test]
fn validation_should_reject_empty_bucket_count() {
    let mut settings = Settings::default();
    settings
        .sharding
        .groups
        .insert("cold".to_string(), ShardingGroupSettings { bucket_count: 0 });

    let err = settings.validate().unwrap_err();
    assert!(err.to_string().contains("sharding.groups.cold.bucket_count must be positive"));
}
