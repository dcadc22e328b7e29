//! # Configuration Management
//!
//! Centralized configuration for the CandleMC server.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment variables via `from_env()`:
//!   `CANDLEMC_SERVER_ADDRESS`, `CANDLEMC_PROTOCOL_VERSION`,
//!   `CANDLEMC_CACHE_DIR`, `CANDLEMC_EVENT_WORKERS`
//!
//! ## Example
//! ```toml
//! [server]
//! address = "0.0.0.0:25565"
//! protocol_version = 769
//!
//! [registry]
//! cache_dir = ".data/candlemc/cache"
//! event_workers = 4
//!
//! [logging]
//! log_level = "debug"
//! ```

use crate::core::frame::MAX_FRAME_SIZE;
use crate::error::{ProtocolError, Result};
use crate::event::DEFAULT_WORKERS;
use crate::protocol::v769;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::Level;

/// Default listen address (vanilla port).
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:25565";

/// Default directory for persisted lookup caches.
pub const DEFAULT_CACHE_DIR: &str = ".data/candlemc/cache";

/// Protocol versions this build ships packet registries for.
pub const SUPPORTED_VERSIONS: &[i32] = &[v769::PROTOCOL_VERSION];

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CandleConfig {
    /// Listener and decoding settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Registry and notification settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CandleConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `CANDLEMC_*` environment variables.
    ///
    /// Unparseable numeric values are rejected rather than ignored.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("CANDLEMC_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(version) = std::env::var("CANDLEMC_PROTOCOL_VERSION") {
            config.server.protocol_version = version.parse::<i32>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid CANDLEMC_PROTOCOL_VERSION: {e}"))
            })?;
        }

        if let Ok(dir) = std::env::var("CANDLEMC_CACHE_DIR") {
            config.registry.cache_dir = dir;
        }

        if let Ok(workers) = std::env::var("CANDLEMC_EVENT_WORKERS") {
            config.registry.event_workers = workers.parse::<usize>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid CANDLEMC_EVENT_WORKERS: {e}"))
            })?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.registry.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Listener and decoding settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:25565")
    pub address: String,

    /// Protocol version incoming connections are decoded with
    pub protocol_version: i32,

    /// Largest accepted frame, in bytes
    pub max_packet_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from(DEFAULT_ADDRESS),
            protocol_version: v769::PROTOCOL_VERSION,
            max_packet_size: MAX_FRAME_SIZE,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:25565')",
                self.address
            ));
        }

        if !SUPPORTED_VERSIONS.contains(&self.protocol_version) {
            errors.push(format!(
                "Unsupported protocol version: {} (supported: {:?})",
                self.protocol_version, SUPPORTED_VERSIONS
            ));
        }

        if self.max_packet_size < 1024 {
            errors.push("Max packet size too small (minimum: 1 KB)".to_string());
        } else if self.max_packet_size > MAX_FRAME_SIZE {
            errors.push(format!(
                "Max packet size too large: {} bytes (maximum: {MAX_FRAME_SIZE})",
                self.max_packet_size
            ));
        }

        errors
    }
}

/// Registry and notification settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directory holding `packet_registry_<version>.bin` cache files
    pub cache_dir: String,

    /// Number of notification delivery workers
    pub event_workers: usize,

    /// Whether lookup caches are loaded and saved on startup
    pub persist_cache: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cache_dir: String::from(DEFAULT_CACHE_DIR),
            event_workers: DEFAULT_WORKERS,
            persist_cache: true,
        }
    }
}

impl RegistryConfig {
    /// Validate registry configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.event_workers == 0 {
            errors.push("Event workers must be greater than 0".to_string());
        } else if self.event_workers > 256 {
            errors.push(format!(
                "Event workers too high: {} (maximum: 256)",
                self.event_workers
            ));
        }

        if self.persist_cache && self.cache_dir.is_empty() {
            errors.push("cache_dir must be specified when persist_cache is true".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level, used when `RUST_LOG` is not set
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        level.as_str().to_ascii_lowercase().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
