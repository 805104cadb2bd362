use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cache::{ResourceType, TtlTable};
use crate::paymo::client::DEFAULT_BASE_URL;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Also write logs to this file
  pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  #[serde(default = "default_base_url")]
  pub base_url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  /// Prefer PAYMO_API_KEY over storing the key here
  pub api_key: Option<String>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      timeout_secs: default_timeout_secs(),
      api_key: None,
    }
  }
}

fn default_base_url() -> String {
  DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Cache file location (defaults to the config directory)
  pub path: Option<PathBuf>,
  /// TTL overrides in seconds, keyed by resource type (e.g. `projects: 600`)
  #[serde(default)]
  pub ttl: BTreeMap<ResourceType, u64>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      ttl: BTreeMap::new(),
    }
  }
}

fn default_true() -> bool {
  true
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./paymo.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/paymo/config.yaml
  ///
  /// With no file found, defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("paymo.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("paymo").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid, all-default config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Get the Paymo API key.
  ///
  /// Checks PAYMO_API_KEY first, then `api.api_key` from the config file.
  pub fn get_api_key(&self) -> Result<String> {
    std::env::var("PAYMO_API_KEY")
      .ok()
      .filter(|key| !key.is_empty())
      .or_else(|| self.api.api_key.clone())
      .ok_or_else(|| {
        eyre!("Paymo API key not found. Set the PAYMO_API_KEY environment variable.")
      })
  }

  /// Resolve the cache file location.
  pub fn cache_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.cache.path {
      return Ok(path.clone());
    }

    let config_dir = dirs::config_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".config")))
      .ok_or_else(|| eyre!("Could not determine config directory"))?;

    Ok(config_dir.join("paymo").join("cache.json"))
  }

  pub fn ttl_table(&self) -> TtlTable {
    TtlTable::with_overrides(&self.cache.ttl)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
    assert_eq!(config.api.timeout_secs, 30);
    assert!(config.cache.enabled);
    assert!(config.cache.ttl.is_empty());
  }

  #[test]
  fn test_parse_full_config() {
    let config = Config::parse(
      r#"
api:
  base_url: http://localhost:8080/api
  timeout_secs: 5
cache:
  enabled: false
  path: /tmp/paymo-cache.json
  ttl:
    projects: 120
    entries: 0
log_file: /tmp/paymo.log
"#,
    )
    .unwrap();

    assert_eq!(config.api.base_url, "http://localhost:8080/api");
    assert_eq!(config.api.timeout_secs, 5);
    assert!(!config.cache.enabled);
    assert_eq!(
      config.cache_path().unwrap(),
      PathBuf::from("/tmp/paymo-cache.json")
    );
    assert_eq!(config.log_file, Some(PathBuf::from("/tmp/paymo.log")));

    let ttls = config.ttl_table();
    assert_eq!(ttls.ttl(ResourceType::Projects), Duration::from_secs(120));
    assert_eq!(ttls.ttl(ResourceType::Entries), Duration::ZERO);
    assert_eq!(ttls.ttl(ResourceType::Tasks), Duration::from_secs(1_800));
  }

  #[test]
  fn test_unknown_ttl_type_rejected() {
    let err = Config::parse("cache:\n  ttl:\n    widgets: 10\n");
    assert!(err.is_err());
  }

  #[test]
  fn test_missing_explicit_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.yaml");
    assert!(Config::load(Some(&missing)).is_err());
  }

  #[test]
  fn test_load_from_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "api:\n  timeout_secs: 9\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.api.timeout_secs, 9);
    assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
  }
}
