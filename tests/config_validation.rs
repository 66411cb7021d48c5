//! Integration tests for configuration loading and validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use rtl433_net::config::{ConfigFile, ConfigModel, ServerConfig, DEFAULT_PORT};
use rtl433_net::error::ProtocolError;
use serde_json::json;
use std::io::Write;
use std::time::Duration;
use tracing::Level;

const FULL: &str = r#"
[server]
interface = "127.0.0.1"
port = 5000
idle_timeout = 2500

[rtl433]
frequency = "915M"
metadata = "level time"
hop_interval = [600, 900]

[rtl433.decoders]
include = "40 41"
exclude = "12"
WS85 = "m=FSK_PCM,s=58,l=58,r=2048,preamble=aa2dd4"

[logging]
log_level = "debug"
json_format = true
"#;

#[test]
fn test_default_config_validates() {
    let config = ConfigModel::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_full_file_loads() {
    let file = ConfigFile::from_toml(FULL).expect("config should parse");
    let model = &file.model;

    assert_eq!(model.server.interface, "127.0.0.1");
    assert_eq!(model.server.port, 5000);
    assert_eq!(model.server.idle_timeout, Duration::from_millis(2500));
    assert_eq!(model.decoder.params["frequency"], json!("915M"));
    assert_eq!(model.decoder.params["hop_interval"], json!([600, 900]));
    assert_eq!(model.decoder.include, "40 41");
    assert_eq!(model.decoder.exclude.as_deref(), Some("12"));
    assert_eq!(
        model.decoder.profiles["WS85"],
        "m=FSK_PCM,s=58,l=58,r=2048,preamble=aa2dd4"
    );
    assert_eq!(file.logging.log_level, Level::DEBUG);
    assert!(file.logging.json_format);
}

#[test]
fn test_optional_fields_take_defaults() {
    let model = ConfigModel::from_toml("[server]\n").expect("minimal config");

    assert_eq!(model.server.interface, "0.0.0.0");
    assert_eq!(model.server.port, DEFAULT_PORT);
    assert_eq!(model.server.idle_timeout, Duration::from_secs(1));
    assert!(model.decoder.params.is_empty());
    assert!(model.decoder.profiles.is_empty());
    assert_eq!(model.decoder.include, "*");
    assert!(model.decoder.exclude.is_none());
}

#[test]
fn test_missing_server_section() {
    let result = ConfigModel::from_toml("[rtl433]\nfrequency = \"433.92M\"\n");
    match result {
        Err(ProtocolError::ConfigError(msg)) => assert!(msg.contains("[server]")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn test_malformed_toml_is_config_error() {
    let result = ConfigModel::from_toml("[server\nport = 1");
    assert!(matches!(result, Err(ProtocolError::ConfigError(_))));
}

#[test]
fn test_wrong_type_is_config_error() {
    let result = ConfigModel::from_toml("[server]\nport = \"not a port\"\n");
    assert!(matches!(result, Err(ProtocolError::ConfigError(_))));
}

#[test]
fn test_invalid_interface() {
    let mut config = ConfigModel::default();
    config.server.interface = "not_an_ip".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Invalid server interface")));
}

#[test]
fn test_empty_interface() {
    let mut config = ConfigModel::default();
    config.server.interface = String::new();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("cannot be empty")));
}

#[test]
fn test_zero_port_rejected_in_file() {
    let result = ConfigModel::from_toml("[server]\nport = 0\n");
    match result {
        Err(ProtocolError::ConfigError(msg)) => {
            assert!(msg.contains("Server port must be greater than 0"))
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn test_idle_timeout_bounds() {
    let mut server = ServerConfig {
        idle_timeout: Duration::from_millis(50),
        ..ServerConfig::default()
    };
    assert!(server
        .validate()
        .iter()
        .any(|e| e.contains("Idle timeout too short")));

    server.idle_timeout = Duration::from_secs(301);
    assert!(server
        .validate()
        .iter()
        .any(|e| e.contains("Idle timeout too long")));
}

#[test]
fn test_frame_size_bounds() {
    let mut server = ServerConfig {
        max_frame_size: 512,
        ..ServerConfig::default()
    };
    assert!(server.validate().iter().any(|e| e.contains("too small")));

    server.max_frame_size = 128 * 1024 * 1024;
    assert!(server.validate().iter().any(|e| e.contains("too large")));
}

#[test]
fn test_empty_profile_spec_rejected() {
    let toml = "[server]\n[rtl433.decoders]\nBroken = \"  \"\n";
    match ConfigModel::from_toml(toml) {
        Err(ProtocolError::ConfigError(msg)) => assert!(msg.contains("'Broken'")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn test_multiple_errors_reported_together() {
    let mut config = ConfigModel::default();
    config.server.port = 0;
    config.server.interface = "nope".into();
    config.decoder.include = String::new();

    let errors = config.validate();
    assert_eq!(errors.len(), 3, "got {errors:?}");

    let strict = config.validate_strict().unwrap_err().to_string();
    assert!(strict.contains("Configuration validation failed"));
}

#[test]
fn test_load_from_file() {
    let path = std::env::temp_dir().join(format!("rtl433net-config-{}.toml", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(FULL.as_bytes()).unwrap();
    drop(file);

    let model = ConfigModel::load(&path);
    std::fs::remove_file(&path).ok();

    assert_eq!(model.unwrap().server.port, 5000);
}

#[test]
fn test_missing_file_is_config_error() {
    let result = ConfigModel::load("/nonexistent/rtl433net.toml");
    assert!(matches!(result, Err(ProtocolError::ConfigError(_))));
}

#[test]
fn test_wire_form_is_plain_json() {
    let model = ConfigModel::from_toml(FULL).unwrap();
    let bytes = model.to_bytes().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(value["server"]["port"], json!(5000));
    assert_eq!(value["server"]["idle_timeout"], json!(2500));
    assert_eq!(value["decoder"]["params"]["metadata"], json!("level time"));
    assert_eq!(
        value["decoder"]["profiles"]["WS85"],
        json!("m=FSK_PCM,s=58,l=58,r=2048,preamble=aa2dd4")
    );
}
