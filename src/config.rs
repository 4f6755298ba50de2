use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::images::DEFAULT_FRESHNESS_DAYS;
use crate::queue::{DEFAULT_MAX_LEN, DEFAULT_STORAGE_KEY};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Where the queue, image cache and logs live (defaults to the platform data dir)
  pub data_dir: Option<PathBuf>,
  #[serde(default)]
  pub queue: QueueConfig,
  #[serde(default)]
  pub images: ImagesConfig,
  #[serde(default)]
  pub network: NetworkConfig,
  #[serde(default)]
  pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
  /// Key-value slot holding the queue
  pub storage_key: String,
  pub max_len: usize,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      storage_key: DEFAULT_STORAGE_KEY.to_string(),
      max_len: DEFAULT_MAX_LEN,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
  /// Database file name inside the data directory
  pub database: String,
  pub freshness_days: i64,
  pub op_timeout_secs: u64,
}

impl Default for ImagesConfig {
  fn default() -> Self {
    Self {
      database: "worker_images.db".to_string(),
      freshness_days: DEFAULT_FRESHNESS_DAYS,
      op_timeout_secs: 10,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  /// `host:port` probed to decide whether we are online
  pub probe_addr: String,
  pub probe_interval_secs: u64,
  pub probe_timeout_ms: u64,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      probe_addr: "1.1.1.1:443".to_string(),
      probe_interval_secs: 30,
      probe_timeout_ms: 3000,
    }
  }
}

impl ImagesConfig {
  /// Freshness window as a duration. Must be positive and representable.
  pub fn freshness(&self) -> Result<chrono::TimeDelta> {
    if self.freshness_days <= 0 {
      return Err(eyre!(
        "images.freshness_days must be positive, got {}",
        self.freshness_days
      ));
    }
    chrono::TimeDelta::try_days(self.freshness_days)
      .ok_or_else(|| eyre!("images.freshness_days is out of range: {}", self.freshness_days))
  }
}

impl NetworkConfig {
  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.probe_interval_secs)
  }

  pub fn probe_timeout(&self) -> Duration {
    Duration::from_millis(self.probe_timeout_ms)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the attendance API, e.g. https://sites.example.com/api
  pub base_url: Option<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./sitecrew.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/sitecrew/config.yaml
  ///
  /// Falls back to defaults when no file is found.
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
    let local = PathBuf::from("sitecrew.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("sitecrew").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file deserializes to null; treat it as all defaults.
    let config: Config = if contents.trim().is_empty() {
      Self::default()
    } else {
      serde_yaml::from_str(contents)?
    };
    config.validate()?;
    Ok(config)
  }

  /// Reject values that would panic or stall at runtime.
  pub fn validate(&self) -> Result<()> {
    if self.network.probe_interval_secs == 0 {
      return Err(eyre!("network.probe_interval_secs must be greater than 0"));
    }
    if self.network.probe_timeout_ms == 0 {
      return Err(eyre!("network.probe_timeout_ms must be greater than 0"));
    }
    if self.images.op_timeout_secs == 0 {
      return Err(eyre!("images.op_timeout_secs must be greater than 0"));
    }
    if self.queue.max_len == 0 {
      return Err(eyre!("queue.max_len must be greater than 0"));
    }
    self.images.freshness()?;
    Ok(())
  }

  /// Resolved data directory.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("sitecrew"))
  }

  pub fn queue_db_path(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("queue.db"))
  }

  pub fn images_db_path(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join(&self.images.database))
  }

  pub fn log_dir(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("logs"))
  }

  /// Optional bearer token for the attendance API.
  ///
  /// Read from SITECREW_API_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("SITECREW_API_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_file_keeps_defaults() {
    let config = Config::parse(
      r#"
data_dir: /tmp/sitecrew-test
queue:
  max_len: 50
images:
  freshness_days: 7
api:
  base_url: https://sites.example.com/api
"#,
    )
    .unwrap();

    assert_eq!(config.queue.max_len, 50);
    assert_eq!(config.queue.storage_key, DEFAULT_STORAGE_KEY);
    assert_eq!(config.images.freshness_days, 7);
    assert_eq!(config.images.database, "worker_images.db");
    assert_eq!(config.network.probe_timeout(), Duration::from_millis(3000));
    assert_eq!(
      config.images_db_path().unwrap(),
      PathBuf::from("/tmp/sitecrew-test/worker_images.db")
    );
    assert_eq!(
      config.api.base_url.as_deref(),
      Some("https://sites.example.com/api")
    );
  }

  #[test]
  fn empty_file_is_all_defaults() {
    let config = Config::parse("\n").unwrap();
    assert_eq!(config.queue.max_len, DEFAULT_MAX_LEN);
    assert_eq!(config.images.freshness_days, DEFAULT_FRESHNESS_DAYS);
    assert!(config.api.base_url.is_none());
  }

  #[test]
  fn zero_intervals_are_rejected() {
    let err = Config::parse("network:\n  probe_interval_secs: 0\n").unwrap_err();
    assert!(err.to_string().contains("probe_interval_secs"));

    assert!(Config::parse("network:\n  probe_timeout_ms: 0\n").is_err());
    assert!(Config::parse("images:\n  op_timeout_secs: 0\n").is_err());
    assert!(Config::parse("queue:\n  max_len: 0\n").is_err());
  }

  #[test]
  fn freshness_must_be_positive_and_in_range() {
    let err = Config::parse("images:\n  freshness_days: 0\n").unwrap_err();
    assert!(err.to_string().contains("freshness_days"));
    assert!(Config::parse("images:\n  freshness_days: -3\n").is_err());

    let huge = format!("images:\n  freshness_days: {}\n", i64::MAX / 1000);
    let err = Config::parse(&huge).unwrap_err();
    assert!(err.to_string().contains("out of range"));

    let config = Config::parse("images:\n  freshness_days: 25\n").unwrap();
    assert_eq!(config.images.freshness().unwrap(), chrono::TimeDelta::days(25));
  }

  #[test]
  fn invalid_file_is_reported_with_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sitecrew.yaml");
    std::fs::write(&path, "network:\n  probe_interval_secs: 0\n").unwrap();

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("sitecrew.yaml"));
  }

  #[test]
  fn missing_explicit_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.yaml");
    assert!(Config::load(Some(&missing)).is_err());
  }

  #[test]
  fn explicit_path_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sitecrew.yaml");
    std::fs::write(&path, "network:\n  probe_addr: 127.0.0.1:8080\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.network.probe_addr, "127.0.0.1:8080");
    assert_eq!(config.network.probe_interval(), Duration::from_secs(30));
  }
}
