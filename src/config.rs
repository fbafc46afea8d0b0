use crate::api::Credentials;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  /// Custom title for header (defaults to the project's app name if not set)
  pub title: Option<String>,
  #[serde(default)]
  pub sort: SortConfig,
  #[serde(default)]
  pub ui: UiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Base url of the project service, without the `/api/v1` suffix
  pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SortConfig {
  /// Initial label sort order for issue lists
  #[serde(default)]
  pub labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UiConfig {
  #[serde(default = "default_tick_rate_ms")]
  pub tick_rate_ms: u64,
}

impl Default for UiConfig {
  fn default() -> Self {
    Self {
      tick_rate_ms: default_tick_rate_ms(),
    }
  }
}

fn default_tick_rate_ms() -> u64 {
  250
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./ghpm.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/ghpm/config.yaml
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
        "No configuration file found. Create one at ~/.config/ghpm/config.yaml\n\
                 with at least:\n\n  server:\n    url: https://pm.example.com"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("ghpm.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("ghpm").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.server.url.trim().is_empty() {
      return Err(eyre!("server.url must not be empty"));
    }
    Ok(config)
  }

  /// Get the service credentials from environment variables.
  ///
  /// Checks GHPM_SESSION (session cookie) first, then GHPM_TOKEN (bearer
  /// token). Without either, requests go out unauthenticated and the first
  /// 401 asks the user to log in.
  pub fn credentials() -> Credentials {
    Self::credentials_from(|name| std::env::var(name).ok())
  }

  fn credentials_from(var: impl Fn(&str) -> Option<String>) -> Credentials {
    let present = |name: &str| var(name).filter(|v| !v.trim().is_empty());

    if let Some(session) = present("GHPM_SESSION") {
      Credentials::Session(session)
    } else if let Some(token) = present("GHPM_TOKEN") {
      Credentials::Bearer(token)
    } else {
      Credentials::Anonymous
    }
  }

  /// Directory for log files: $XDG_DATA_HOME/ghpm
  pub fn data_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
      .map(|dir| dir.join("ghpm"))
      .ok_or_else(|| eyre!("Could not determine data directory"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_minimal() {
    let config = Config::parse("server:\n  url: https://pm.example.com\n").unwrap();

    assert_eq!(config.server.url, "https://pm.example.com");
    assert!(config.title.is_none());
    assert!(config.sort.labels.is_empty());
    assert_eq!(config.ui.tick_rate_ms, 250);
  }

  #[test]
  fn test_parse_full() {
    let yaml = r#"
server:
  url: http://localhost:8000
title: Roadmap
sort:
  labels: [bug, "good first issue"]
ui:
  tick_rate_ms: 100
"#;
    let config = Config::parse(yaml).unwrap();

    assert_eq!(config.title.as_deref(), Some("Roadmap"));
    assert_eq!(config.sort.labels, vec!["bug", "good first issue"]);
    assert_eq!(config.ui.tick_rate_ms, 100);
  }

  #[test]
  fn test_parse_requires_server_url() {
    assert!(Config::parse("title: x\n").is_err());
    assert!(Config::parse("server:\n  url: \"  \"\n").is_err());
  }

  #[test]
  fn test_credentials_precedence() {
    let env = |pairs: &'static [(&'static str, &'static str)]| {
      move |name: &str| {
        pairs
          .iter()
          .find(|(k, _)| *k == name)
          .map(|(_, v)| v.to_string())
      }
    };

    assert_eq!(
      Config::credentials_from(env(&[("GHPM_SESSION", "abc"), ("GHPM_TOKEN", "t")])),
      Credentials::Session("abc".to_string())
    );
    assert_eq!(
      Config::credentials_from(env(&[("GHPM_SESSION", " "), ("GHPM_TOKEN", "t")])),
      Credentials::Bearer("t".to_string())
    );
    assert_eq!(Config::credentials_from(env(&[])), Credentials::Anonymous);
  }
}
