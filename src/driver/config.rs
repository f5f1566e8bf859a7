//! Configuration for archiving store drivers

use crate::driver::export_store::ExportArchivingStore;
use crate::driver::local_store::LocalArchivingStore;
use crate::driver::registry::{DriverRegistry, RegistryError};
use crate::driver::{DriverSettings, DEFAULT_SAFETY_MARGIN};
use crate::files::FileStorage;
use crate::jobs::JobDirectory;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

fn default_export_path() -> PathBuf {
    PathBuf::from("./data/export")
}

fn default_safety_margin() -> u64 {
    DEFAULT_SAFETY_MARGIN
}

/// Export driver settings, disabled unless `enabled: true` is given
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDriverConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_safety_margin")]
    pub safety_margin_bytes: u64,
    /// Root of the exported directory tree
    #[serde(default = "default_export_path")]
    pub export_path: PathBuf,
}

impl ExportDriverConfig {
    pub fn settings(&self) -> DriverSettings {
        DriverSettings {
            enabled: self.enabled,
            safety_margin_bytes: self.safety_margin_bytes,
        }
    }
}

impl Default for ExportDriverConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            safety_margin_bytes: DEFAULT_SAFETY_MARGIN,
            export_path: default_export_path(),
        }
    }
}

/// Settings for every driver type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriversConfig {
    #[serde(default)]
    pub local: DriverSettings,
    #[serde(default)]
    pub export: ExportDriverConfig,
}

impl DriversConfig {
    /// Build a registry holding every enabled driver
    pub fn create_registry(
        &self,
        files: Arc<dyn FileStorage>,
        jobs: Arc<dyn JobDirectory>,
    ) -> Result<DriverRegistry, RegistryError> {
        let mut registry = DriverRegistry::new();

        if self.local.enabled {
            registry.register(Arc::new(LocalArchivingStore::new(files, jobs, self.local.clone())))?;
        } else {
            info!("Local driver disabled");
        }

        if self.export.enabled {
            let export = ExportArchivingStore::open(&self.export.export_path, self.export.settings())
                .map_err(|source| RegistryError::Setup { driver: "export", source })?;
            registry.register(Arc::new(export))?;
        } else {
            info!("Export driver disabled");
        }

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::mock_store::MockFileStore;
    use crate::jobs::mock_store::MockJobDirectory;

    #[test]
    fn test_drivers_config_defaults() {
        let config = DriversConfig::default();
        assert!(config.local.enabled);
        assert!(!config.export.enabled);
        assert_eq!(config.export.export_path, PathBuf::from("./data/export"));
    }

    #[test]
    fn test_drivers_config_from_yaml() {
        let yaml = r#"
local:
  enabled: false
export:
  enabled: true
  safety_margin_bytes: 2048
  export_path: /srv/export
"#;
        let config: DriversConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.local.enabled);
        assert_eq!(config.local.safety_margin_bytes, DEFAULT_SAFETY_MARGIN);
        assert!(config.export.enabled);
        assert_eq!(config.export.settings().safety_margin_bytes, 2048);
        assert_eq!(config.export.export_path, PathBuf::from("/srv/export"));
    }

    #[test]
    fn test_export_section_without_enabled_stays_disabled() {
        let yaml = r#"
export:
  export_path: /srv/export
"#;
        let config: DriversConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.local.enabled);
        assert!(!config.export.enabled);
        assert_eq!(config.export.safety_margin_bytes, DEFAULT_SAFETY_MARGIN);
        assert_eq!(config.export, ExportDriverConfig {
            export_path: PathBuf::from("/srv/export"),
            ..ExportDriverConfig::default()
        });

        let registry = config
            .create_registry(Arc::new(MockFileStore::new()), Arc::new(MockJobDirectory::new()))
            .unwrap();
        assert_eq!(registry.names(), vec!["local"]);
    }

    #[test]
    fn test_create_registry_registers_enabled_drivers() {
        let files = Arc::new(MockFileStore::new());
        let jobs = Arc::new(MockJobDirectory::new());

        let registry = DriversConfig::default().create_registry(files.clone(), jobs.clone()).unwrap();
        assert_eq!(registry.names(), vec!["local"]);

        let dir = tempfile::tempdir().unwrap();
        let config = DriversConfig {
            local: DriverSettings::disabled(),
            export: ExportDriverConfig {
                enabled: true,
                export_path: dir.path().join("out"),
                ..ExportDriverConfig::default()
            },
        };
        let registry = config.create_registry(files, jobs).unwrap();
        assert_eq!(registry.names(), vec!["export"]);
        assert!(dir.path().join("out").is_dir());
    }
}
