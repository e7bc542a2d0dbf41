// YAML configuration for the tftstore CLI

use crate::cache::CATALOG_KEY;
use crate::catalog::LoadOptions;
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Settings read from `config.yml`; every field is optional in the file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Directory of API dumps read by `DirSource`
    pub data_dir: Option<PathBuf>,
    /// Directory holding the `.tftstore` snapshot database
    pub store_path: PathBuf,
    /// Key the catalog snapshot is cached under
    pub snapshot_key: String,
    /// Snapshots older than this many seconds are refetched
    pub max_age_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            store_path: PathBuf::from("."),
            snapshot_key: CATALOG_KEY.to_string(),
            max_age_secs: None,
        }
    }
}

impl Config {
    /// `<config_dir>/tftstore/config.yml`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tftstore").join("config.yml"))
    }

    /// Load from `path`, or from the default location when `path` is `None`
    ///
    /// A missing file at the default location yields the defaults; an
    /// explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(eyre!("Config file not found: {:?}", path));
                }
                Self::load_file(path)
            }
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_file(&path),
                _ => {
                    debug!("No config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read config {:?}", path))?;

        // An empty file deserializes to unit, not a mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self =
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config {:?}", path))?;
        debug!(path = ?path, "Loaded config");
        Ok(config)
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }

    /// Catalog load options for this configuration
    pub fn load_options(&self, refresh: bool) -> LoadOptions {
        LoadOptions {
            key: self.snapshot_key.clone(),
            refresh,
            max_age: self.max_age(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.store_path, PathBuf::from("."));
        assert_eq!(config.snapshot_key, "catalog");
        assert!(config.data_dir.is_none());
        assert!(config.max_age().is_none());
    }

    #[test]
    fn test_load_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yml");
        fs::write(
            &path,
            "data-dir: /srv/tft/dumps\nsnapshot-key: set14\nmax-age-secs: 3600\n",
        )
        .unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/tft/dumps")));
        assert_eq!(config.snapshot_key, "set14");
        assert_eq!(config.max_age(), Some(Duration::from_secs(3600)));
        // Unset fields keep their defaults
        assert_eq!(config.store_path, PathBuf::from("."));
    }

    #[test]
    fn test_empty_file_is_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yml");
        fs::write(&path, "\n").unwrap();

        assert_eq!(Config::load(Some(path.as_path())).unwrap(), Config::default());
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        assert!(Config::load(Some(temp.path().join("nope.yml").as_path())).is_err());
    }

    #[test]
    fn test_invalid_yaml_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yml");
        fs::write(&path, "max-age-secs: soon\n").unwrap();

        assert!(Config::load(Some(path.as_path())).is_err());
    }

    #[test]
    fn test_load_options() {
        let config = Config {
            snapshot_key: "set14".to_string(),
            max_age_secs: Some(60),
            ..Config::default()
        };

        let options = config.load_options(true);
        assert_eq!(options.key, "set14");
        assert!(options.refresh);
        assert_eq!(options.max_age, Some(Duration::from_secs(60)));
    }
}
