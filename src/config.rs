//! Application Configuration
//!
//! This module provides configuration management for the application,
//! supporting YAML configuration files with sensible defaults.

use crate::driver::config::DriversConfig;
use crate::files::config::FilesConfig;
use crate::jobs::config::JobsConfig;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "ARCHIVE_CONFIG";

/// Configuration file used when the environment does not name one
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// File store configuration
    #[serde(default)]
    pub files: FilesConfig,
    /// Job directory configuration
    #[serde(default)]
    pub jobs: JobsConfig,
    /// Driver configuration
    #[serde(default)]
    pub drivers: DriversConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Number of worker threads
    pub workers: usize,
    /// Maximum payload size in bytes
    pub max_payload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9710,
            workers: 4,
            max_payload_size: 1024 * 1024 * 1024, // 1GB
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Path to log4rs configuration file
    pub config_file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("server_log.yaml"),
        }
    }
}

impl AppConfig {
    /// Load configuration from `$ARCHIVE_CONFIG` or `config.yaml`, use defaults if not found
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file, use defaults if it does not exist
    pub fn load_from(config_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            let config: AppConfig = serde_yaml::from_str(&content)?;
            info!("Loaded configuration from {}", config_path.display());
            Ok(config)
        } else {
            warn!("Config file {} not found, using defaults", config_path.display());
            Ok(Self::default())
        }
    }
}
