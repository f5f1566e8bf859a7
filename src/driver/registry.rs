//! Name keyed registry of configured drivers

use crate::driver::{ArchivingStore, FileHandle, StorageError, StorageResult, StorageTier};
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building or querying the registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("driver {0} is already registered")]
    Duplicate(String),

    #[error("unknown driver {0}")]
    Unknown(String),

    #[error("cannot set up driver {driver}: {source}")]
    Setup {
        driver: &'static str,
        #[source]
        source: StorageError,
    },
}

/// Snapshot of a driver's descriptors, used for placement decisions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverStatus {
    pub name: &'static str,
    pub display_name: &'static str,
    pub tier: StorageTier,
    pub supports_retrieve: bool,
    pub available: bool,
    pub free_bytes: Option<u64>,
}

/// Drivers in registration order, which doubles as preference order for `select`
#[derive(Default)]
pub struct DriverRegistry {
    drivers: Vec<Arc<dyn ArchivingStore>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a driver. Names must be unique.
    pub fn register(&mut self, driver: Arc<dyn ArchivingStore>) -> Result<(), RegistryError> {
        if self.drivers.iter().any(|d| d.name() == driver.name()) {
            return Err(RegistryError::Duplicate(driver.name().to_string()));
        }
        info!(
            "Registered driver {} ({}, tier {})",
            driver.name(),
            driver.display_name(),
            driver.storage_tier()
        );
        self.drivers.push(driver);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ArchivingStore>, RegistryError> {
        self.drivers
            .iter()
            .find(|d| d.name() == name)
            .cloned()
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))
    }

    /// The driver that issued `handle`
    pub fn for_handle(&self, handle: &FileHandle) -> StorageResult<Arc<dyn ArchivingStore>> {
        self.get(handle.driver_name()).map_err(|_| {
            StorageError::InvalidHandle(format!("no driver named {:?} is configured", handle.driver_name()))
        })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.drivers.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    pub fn statuses(&self) -> Vec<DriverStatus> {
        self.drivers
            .iter()
            .map(|d| {
                let free_bytes = d.free_bytes();
                DriverStatus {
                    name: d.name(),
                    display_name: d.display_name(),
                    tier: d.storage_tier(),
                    supports_retrieve: d.supports_retrieve(),
                    available: d.is_available(),
                    free_bytes,
                }
            })
            .collect()
    }

    /// First available driver of `tier`, or of any tier when `None`
    pub fn select(&self, tier: Option<StorageTier>) -> Option<Arc<dyn ArchivingStore>> {
        let selected = self
            .drivers
            .iter()
            .filter(|d| tier.map_or(true, |tier| d.storage_tier() == tier))
            .find(|d| d.is_available())
            .cloned();
        debug!(
            "Selected driver {:?} for tier {:?}",
            selected.as_ref().map(|d| d.name()),
            tier
        );
        selected
    }
}
