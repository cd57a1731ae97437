use serial_test::serial;
use temp_env::with_vars;

use super::*;
use crate::Error;

fn cleanup_all_precondition_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("PRECONDITION__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = Settings::default();

    assert_eq!(config.observing.queue_warning_threshold, 200);
    assert_eq!(config.observing.queue_capacity, 0);
    assert!(!config.observing.is_bounded());
    assert_eq!(config.lock.slow_hold_warning_ms, 5_000);
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_precondition_env_vars();
    with_vars(
        vec![
            ("PRECONDITION__OBSERVING__QUEUE_WARNING_THRESHOLD", Some("50")),
            ("PRECONDITION__LOCK__SLOW_HOLD_WARNING_MS", Some("750")),
        ],
        || {
            let config = Settings::new().unwrap();

            assert_eq!(config.observing.queue_warning_threshold, 50);
            assert_eq!(config.lock.slow_hold_warning_ms, 750);
        },
    );
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_precondition_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("precondition.toml");

    std::fs::write(
        &config_path,
        r#"
        [observing]
        queue_capacity = 4096

        [lock]
        slow_hold_warning_ms = 100
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base_config = Settings::new().expect("success");
        let config = base_config
            .with_override_config(config_path.to_str().unwrap())
            .unwrap();

        assert_eq!(config.observing.queue_capacity, 4096);
        assert_eq!(config.observing.queue_warning_threshold, 200);
        assert_eq!(config.lock.slow_hold_warning_ms, 100);
    });
}

#[test]
#[serial]
fn config_path_env_var_should_be_loaded() {
    cleanup_all_precondition_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("from_env.toml");
    std::fs::write(&config_path, "[observing]\nqueue_warning_threshold = 10\n").unwrap();

    with_vars(vec![("CONFIG_PATH", Some(config_path.to_str().unwrap()))], || {
        let config = Settings::new().unwrap();
        assert_eq!(config.observing.queue_warning_threshold, 10);
    });
}

#[test]
fn validation_should_accept_defaults() {
    assert!(Settings::default().validate().is_ok());
}

#[test]
fn validation_should_fail_with_zero_warning_threshold() {
    let mut config = Settings::default();
    config.observing.queue_warning_threshold = 0;

    let result = config.validate();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn validation_should_fail_with_capacity_below_threshold() {
    let mut config = Settings::default();
    config.observing.queue_capacity = 10;

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("queue_capacity"));
}

#[test]
fn validation_should_fail_with_zero_slow_hold_warning() {
    let mut config = Settings::default();
    config.lock.slow_hold_warning_ms = 0;

    assert!(matches!(config.validate(), Err(Error::Config(_))));
}
