//! Tests for layered configuration loading.

use serial_test::serial;
use std::io::Write;
use ugv_harness::config::{AcquisitionMode, AuthPolicy, HarnessConfig};
use ugv_harness::tracing_setup::OutputFormat;
use ugv_harness::HarnessError;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write temp file");
    file
}

#[test]
#[serial]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = HarnessConfig::load_from(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, HarnessConfig::default());
}

#[test]
#[serial]
fn test_file_overrides_defaults() {
    let file = write_config(
        r#"
        [application]
        log_format = "json"

        [lidar]
        host = "10.0.0.7"
        port = 2111
        poll_interval_ms = 50
        auth = { mode = "identifier", identifier = "z1234567" }

        [modules]
        display_ms = 250
        "#,
    );

    let config = HarnessConfig::load_from(file.path()).unwrap();
    assert_eq!(config.application.log_format, OutputFormat::Json);
    assert_eq!(config.lidar.endpoint(), "10.0.0.7:2111");
    assert_eq!(config.lidar.poll_interval_ms, 50);
    assert!(matches!(config.lidar.auth, AuthPolicy::Identifier { .. }));
    assert_eq!(config.modules.display_ms, 250);
    assert_eq!(config.modules.gnss_ms, 150);
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let file = write_config(
        r#"
        [lidar]
        port = 2111
        "#,
    );

    std::env::set_var("UGV_LIDAR__PORT", "23001");
    std::env::set_var("UGV_LIDAR__MODE", "simulate");
    let result = HarnessConfig::load_from(file.path());
    std::env::remove_var("UGV_LIDAR__PORT");
    std::env::remove_var("UGV_LIDAR__MODE");

    let config = result.unwrap();
    assert_eq!(config.lidar.port, 23001);
    assert_eq!(config.lidar.mode, AcquisitionMode::Simulate);
}

#[test]
#[serial]
fn test_invalid_values_are_rejected() {
    let file = write_config(
        r#"
        [lidar]
        carry_limit = 100
        read_chunk = 4096
        "#,
    );
    let err = HarnessConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, HarnessError::Configuration(_)));
    assert!(err.to_string().contains("carry_limit"));
}

#[test]
#[serial]
fn test_malformed_file_is_a_config_error() {
    let file = write_config("[lidar\nport = ");
    let err = HarnessConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, HarnessError::Config(_)));
}

#[test]
#[serial]
fn test_unknown_mode_is_rejected() {
    let file = write_config(
        r#"
        [lidar]
        mode = "telepathy"
        "#,
    );
    assert!(HarnessConfig::load_from(file.path()).is_err());
}

#[test]
fn test_shipped_config_is_valid() {
    let shipped = concat!(env!("CARGO_MANIFEST_DIR"), "/config/harness.toml");
    let config = HarnessConfig::from_toml_str(&std::fs::read_to_string(shipped).unwrap()).unwrap();
    assert_eq!(config, HarnessConfig::default());
}

#[test]
fn test_dump_round_trips() {
    let mut config = HarnessConfig::default();
    config.lidar.auth = AuthPolicy::Identifier {
        identifier: "z1234567".to_string(),
    };
    config.lidar.mode = AcquisitionMode::Simulate;
    let rendered = config.to_toml().unwrap();
    assert_eq!(HarnessConfig::from_toml_str(&rendered).unwrap(), config);
}
