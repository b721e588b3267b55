use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::query::RunnerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub polling: PollingConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub session: SessionConfig,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the backend, e.g. https://helpdesk.example.edu/api/
  pub url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  10
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

/// Polling cadence per view, in milliseconds
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollingConfig {
  pub tickets_ms: u64,
  pub ticket_detail_ms: u64,
  pub comments_ms: u64,
  pub notifications_ms: u64,
}

impl Default for PollingConfig {
  fn default() -> Self {
    Self {
      tickets_ms: 5_000,
      ticket_detail_ms: 5_000,
      comments_ms: 3_000,
      notifications_ms: 10_000,
    }
  }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
  /// Freshness of ticket, comment and notification data
  pub list_stale_ms: u64,
  /// Freshness of users, stats and the current user
  pub reference_stale_ms: u64,
  /// Retention of ticket detail and comment entries once unmounted
  pub detail_gc_secs: u64,
  pub retry_delay_ms: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      list_stale_ms: 0,
      reference_stale_ms: 60_000,
      detail_gc_secs: 300,
      retry_delay_ms: 1_000,
    }
  }
}

impl CacheConfig {
  pub fn runner(&self) -> RunnerConfig {
    RunnerConfig {
      retry_delay: Duration::from_millis(self.retry_delay_ms),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStoreKind {
  /// Persist in the platform data directory
  #[default]
  Sqlite,
  /// Forget on exit
  Memory,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
  pub logout_grace_ms: u64,
  pub credential_store: CredentialStoreKind,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      logout_grace_ms: 1_500,
      credential_store: CredentialStoreKind::Sqlite,
    }
  }
}

impl SessionConfig {
  pub fn logout_grace(&self) -> Duration {
    Duration::from_millis(self.logout_grace_ms)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./ticketdesk.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/ticketdesk/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/ticketdesk/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("ticketdesk.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("ticketdesk").join("config.yaml");
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

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Header title: the configured one, or the API host.
  pub fn display_title(&self) -> String {
    if let Some(title) = &self.title {
      return title.clone();
    }
    url::Url::parse(&self.api.url)
      .ok()
      .and_then(|u| u.host_str().map(str::to_string))
      .unwrap_or_else(|| self.api.url.clone())
  }

  /// Get the sign-in password from the environment.
  ///
  /// Checks TICKETDESK_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("TICKETDESK_PASSWORD")
      .map_err(|_| eyre!("Password not found. Set TICKETDESK_PASSWORD environment variable."))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("api:\n  url: https://helpdesk.example.edu/api/\n").unwrap();
    assert_eq!(config.api.timeout(), Duration::from_secs(10));
    assert_eq!(config.polling, PollingConfig::default());
    assert_eq!(config.session.credential_store, CredentialStoreKind::Sqlite);
    assert_eq!(config.cache.runner().retry_delay, Duration::from_secs(1));
    assert_eq!(config.display_title(), "helpdesk.example.edu");
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
api:
  url: http://localhost:8000/api/
  timeout_secs: 3
polling:
  tickets_ms: 2000
cache:
  detail_gc_secs: 60
session:
  logout_grace_ms: 500
  credential_store: memory
title: IT Helpdesk
"#;
    let config = Config::parse(yaml).unwrap();
    assert_eq!(config.api.timeout_secs, 3);
    assert_eq!(config.polling.tickets_ms, 2000);
    assert_eq!(config.polling.comments_ms, 3000);
    assert_eq!(config.cache.detail_gc_secs, 60);
    assert_eq!(config.session.logout_grace(), Duration::from_millis(500));
    assert_eq!(config.session.credential_store, CredentialStoreKind::Memory);
    assert_eq!(config.display_title(), "IT Helpdesk");
  }

  #[test]
  fn test_missing_url_is_an_error() {
    assert!(Config::parse("title: x\n").is_err());
  }

  #[test]
  fn test_explicit_missing_path() {
    let err = Config::load(Some(Path::new("/nonexistent/ticketdesk.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
