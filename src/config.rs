use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the upstream base URL
pub const URL_ENV: &str = "BINJA_URL";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
  pub upstream: UpstreamConfig,
  pub paging: PagingConfig,
  pub cache: CacheConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
  /// Base URL of the Binary Ninja HTTP server
  pub url: String,
  pub connect_timeout_ms: u64,
  /// Upper bound for a whole request once connected
  pub read_timeout_ms: u64,
  /// Extra attempts after the first on transport failure
  pub max_retries: u32,
  /// Delay before retry `n` is `n * retry_backoff_base_ms`
  pub retry_backoff_base_ms: u64,
}

impl Default for UpstreamConfig {
  fn default() -> Self {
    Self {
      url: "http://localhost:9009".to_string(),
      connect_timeout_ms: 1000,
      read_timeout_ms: 8000,
      max_retries: 2,
      retry_backoff_base_ms: 200,
    }
  }
}

impl UpstreamConfig {
  pub fn connect_timeout(&self) -> Duration {
    Duration::from_millis(self.connect_timeout_ms)
  }

  pub fn read_timeout(&self) -> Duration {
    Duration::from_millis(self.read_timeout_ms)
  }

  pub fn retry_backoff_base(&self) -> Duration {
    Duration::from_millis(self.retry_backoff_base_ms)
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PagingConfig {
  /// Page size when the caller gives none
  pub default_limit: u64,
  pub max_limit: u64,
}

impl Default for PagingConfig {
  fn default() -> Self {
    Self {
      default_limit: 100,
      max_limit: 1000,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
  /// 0 disables caching
  pub ttl_ms: u64,
  /// 0 means unbounded
  pub max_entries: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_ms: 3000,
      max_entries: 1024,
    }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_millis(self.ttl_ms)
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
  /// Filter directive used when RUST_LOG is unset
  pub level: String,
  /// Also write a daily rolling log under this path
  pub file: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./binja-bridge.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/binja-bridge/config.yaml
  /// 4. Built-in defaults
  ///
  /// `BINJA_URL` overrides the upstream URL of whichever source was used.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Ok(url) = std::env::var(URL_ENV) {
      config.apply_url(&url);
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("binja-bridge.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("binja-bridge").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Replace the upstream URL. Blank values are ignored.
  pub fn apply_url(&mut self, url: &str) {
    let url = url.trim();
    if !url.is_empty() {
      self.upstream.url = url.to_string();
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.paging.max_limit == 0 {
      return Err(eyre!("paging.max_limit must be at least 1"));
    }
    if self.paging.default_limit > self.paging.max_limit {
      return Err(eyre!(
        "paging.default_limit ({}) exceeds paging.max_limit ({})",
        self.paging.default_limit,
        self.paging.max_limit
      ));
    }
    url::Url::parse(&self.upstream.url)
      .map_err(|e| eyre!("Invalid upstream URL '{}': {}", self.upstream.url, e))?;
    Ok(())
  }
}
