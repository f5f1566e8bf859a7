//! Application State Management
//!
//! This module provides the application state shared by all HTTP workers:
//! the driver registry built from configuration, plus the configuration itself.

use std::sync::Arc;
use log::info;

use crate::config::AppConfig;
use crate::driver::DriverRegistry;

/// Application state containing the configured drivers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DriverRegistry>,
    pub config: AppConfig,
}

impl AppState {
    /// Create application state from configuration
    ///
    /// Opens the file store and job directory, then registers every enabled driver.
    pub fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing application state with configuration");

        let files = config.files.create_store()?;
        let jobs = config.jobs.create_directory()?;
        let registry = config.drivers.create_registry(files, jobs)?;

        if registry.is_empty() {
            info!("No archiving drivers enabled");
        }
        info!("Application state initialized with drivers: {:?}", registry.names());
        Ok(Self::with_registry(registry, config))
    }

    /// Create application state around an already built registry
    pub fn with_registry(registry: DriverRegistry, config: AppConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
        }
    }
}
