use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the directory backend, e.g. "https://example.com/api"
  pub base_url: String,
  /// Request timeout in seconds
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// How long a cache entry with no subscribers survives before eviction,
  /// in seconds
  #[serde(default = "default_gc_grace_secs")]
  pub gc_grace_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_gc_grace_secs() -> u64 {
  300
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      gc_grace_secs: default_gc_grace_secs(),
    }
  }
}

impl SyncConfig {
  pub fn gc_grace(&self) -> Duration {
    Duration::from_secs(self.gc_grace_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./staffdir.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/staffdir/config.yaml
  ///
  /// The STAFFDIR_API_URL environment variable overrides the configured
  /// base URL either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(Error::Config(format!("config file not found: {}", p.display())));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        return Err(Error::Config(
          "no configuration file found; create one at ~/.config/staffdir/config.yaml".into(),
        ))
      }
    };

    if let Ok(url) = std::env::var("STAFFDIR_API_URL") {
      config.api.base_url = url;
    }

    Ok(config)
  }

  /// Build a configuration directly from a base URL, with defaults for
  /// everything else. Useful when the host application owns configuration.
  pub fn from_base_url(base_url: impl Into<String>) -> Self {
    Self {
      api: ApiConfig {
        base_url: base_url.into(),
        timeout_secs: default_timeout_secs(),
      },
      sync: SyncConfig::default(),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("staffdir.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("staffdir").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| Error::Config(format!("failed to read config file {}: {}", path.display(), e)))?;

    serde_yaml::from_str(&contents)
      .map_err(|e| Error::Config(format!("failed to parse config file {}: {}", path.display(), e)))
  }
}
