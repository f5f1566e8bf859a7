use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage class of a driver, used by placement logic to pick drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTier {
    /// Storage on the same host, fast and retrievable
    Local,
    /// Network or managed object storage
    Remote,
    /// Archive or export targets, slow or write-only
    Cold,
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageTier::Local => "local",
            StorageTier::Remote => "remote",
            StorageTier::Cold => "cold",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for StorageTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(StorageTier::Local),
            "remote" => Ok(StorageTier::Remote),
            "cold" => Ok(StorageTier::Cold),
            _ => Err(format!("Unknown storage tier: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_tier_from_str() {
        assert_eq!("local".parse::<StorageTier>().unwrap(), StorageTier::Local);
        assert_eq!("REMOTE".parse::<StorageTier>().unwrap(), StorageTier::Remote);
        assert_eq!("Cold".parse::<StorageTier>().unwrap(), StorageTier::Cold);
        assert!("tape".parse::<StorageTier>().is_err());
    }

    #[test]
    fn test_storage_tier_display_matches_serde() {
        for tier in [StorageTier::Local, StorageTier::Remote, StorageTier::Cold] {
            let json = serde_json::to_string(&tier).unwrap();
            assert_eq!(json, format!("\"{}\"", tier));
        }
    }
}
