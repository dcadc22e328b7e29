//! Integration tests for configuration validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use candlemc::config::{CandleConfig, RegistryConfig, ServerConfig, DEFAULT_CACHE_DIR};
use candlemc::core::frame::MAX_FRAME_SIZE;
use candlemc::error::ProtocolError;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = CandleConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
    assert_eq!(config.server.address, "0.0.0.0:25565");
    assert_eq!(config.server.protocol_version, 769);
    assert_eq!(config.server.max_packet_size, MAX_FRAME_SIZE);
    assert_eq!(config.registry.cache_dir, DEFAULT_CACHE_DIR);
    assert!(config.registry.persist_cache);
}

#[test]
fn test_invalid_server_address() {
    let mut config = CandleConfig::default();
    config.server.address = "invalid_address".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Invalid server address")));
}

#[test]
fn test_unsupported_protocol_version() {
    let config = CandleConfig::default_with_overrides(|c| c.server.protocol_version = 47);
    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Unsupported protocol version")));
}

#[test]
fn test_packet_size_bounds() {
    let small = ServerConfig {
        max_packet_size: 10,
        ..ServerConfig::default()
    };
    assert!(small.validate().iter().any(|e| e.contains("too small")));

    let large = ServerConfig {
        max_packet_size: MAX_FRAME_SIZE + 1,
        ..ServerConfig::default()
    };
    assert!(large.validate().iter().any(|e| e.contains("too large")));
}

#[test]
fn test_registry_config() {
    let zero = RegistryConfig {
        event_workers: 0,
        ..RegistryConfig::default()
    };
    assert!(zero.validate().iter().any(|e| e.contains("greater than 0")));

    let no_dir = RegistryConfig {
        cache_dir: String::new(),
        ..RegistryConfig::default()
    };
    assert_eq!(no_dir.validate().len(), 1);

    let no_dir_no_persist = RegistryConfig {
        cache_dir: String::new(),
        persist_cache: false,
        ..RegistryConfig::default()
    };
    assert!(no_dir_no_persist.validate().is_empty());
}

#[test]
fn test_validate_strict_collects_everything() {
    let config = CandleConfig::default_with_overrides(|c| {
        c.server.address = String::new();
        c.registry.event_workers = 0;
    });

    let message = match config.validate_strict() {
        Err(ProtocolError::ConfigError(message)) => message,
        other => panic!("expected ConfigError, got {other:?}"),
    };
    assert!(message.contains("Server address cannot be empty"));
    assert!(message.contains("Event workers"));
}

#[test]
fn test_partial_toml_uses_defaults() {
    let config = CandleConfig::from_toml(
        r#"
        [server]
        address = "127.0.0.1:25566"

        [logging]
        log_level = "debug"
        json_format = true
        "#,
    )
    .unwrap();

    assert_eq!(config.server.address, "127.0.0.1:25566");
    assert_eq!(config.server.protocol_version, 769);
    assert_eq!(config.registry.event_workers, 4);
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert!(config.logging.json_format);
}

#[test]
fn test_bad_toml_is_config_error() {
    assert!(matches!(
        CandleConfig::from_toml("[server]\naddress = 5"),
        Err(ProtocolError::ConfigError(_))
    ));
    assert!(matches!(
        CandleConfig::from_toml("[logging]\nlog_level = \"loud\""),
        Err(ProtocolError::ConfigError(_))
    ));
}

#[test]
fn test_example_config_roundtrips() {
    let example = CandleConfig::example_config();
    let parsed = CandleConfig::from_toml(&example).unwrap();
    assert_eq!(parsed.server.address, CandleConfig::default().server.address);
    assert_eq!(parsed.logging.log_level, Level::INFO);
}

#[test]
fn test_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("candlemc.toml");
    std::fs::write(&path, "[registry]\nevent_workers = 8\npersist_cache = false\n").unwrap();

    let config = CandleConfig::from_file(&path).unwrap();
    assert_eq!(config.registry.event_workers, 8);
    assert!(!config.registry.persist_cache);

    assert!(matches!(
        CandleConfig::from_file(dir.path().join("missing.toml")),
        Err(ProtocolError::ConfigError(_))
    ));
}

// The only test in this binary touching CANDLEMC_* variables.
#[test]
fn test_env_overrides() {
    std::env::set_var("CANDLEMC_SERVER_ADDRESS", "127.0.0.1:30000");
    std::env::set_var("CANDLEMC_EVENT_WORKERS", "2");
    std::env::set_var("CANDLEMC_CACHE_DIR", "/tmp/candle-cache");
    let config = CandleConfig::from_env().unwrap();
    assert_eq!(config.server.address, "127.0.0.1:30000");
    assert_eq!(config.registry.event_workers, 2);
    assert_eq!(config.registry.cache_dir, "/tmp/candle-cache");

    std::env::set_var("CANDLEMC_PROTOCOL_VERSION", "not-a-number");
    assert!(matches!(
        CandleConfig::from_env(),
        Err(ProtocolError::ConfigError(_))
    ));

    for var in [
        "CANDLEMC_SERVER_ADDRESS",
        "CANDLEMC_EVENT_WORKERS",
        "CANDLEMC_CACHE_DIR",
        "CANDLEMC_PROTOCOL_VERSION",
    ] {
        std::env::remove_var(var);
    }
}
