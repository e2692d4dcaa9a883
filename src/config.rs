use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Site the worker sits in front of; relative URLs resolve against it
  pub origin: Option<Url>,
  /// Address the local proxy listens on
  pub listen: String,
  pub cache: CacheConfig,
  /// Shell URLs written into the static partition at install
  pub precache: Vec<String>,
  pub routes: RoutesConfig,
  pub health: HealthConfig,
  pub logging: LoggingConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: None,
      listen: "127.0.0.1:8080".to_string(),
      cache: CacheConfig::default(),
      precache: [
        "/",
        "/offline",
        "/manifest.json",
        "/icons/icon-192x192.png",
        "/icons/icon-512x512.png",
      ]
      .map(String::from)
      .to_vec(),
      routes: RoutesConfig::default(),
      health: HealthConfig::default(),
      logging: LoggingConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Partition name prefix, e.g. `snu-connectome-static-v1`
  pub prefix: String,
  /// Bumping this retires every partition of the previous version
  pub version: String,
  pub max_dynamic_entries: usize,
  /// SQLite database path (defaults to the user data directory)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      prefix: "snu-connectome".to_string(),
      version: "v1".to_string(),
      max_dynamic_entries: 50,
      path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
  /// Path fragments that mark build output and static media
  pub static_markers: Vec<String>,
  /// Path suffixes served from the static partition
  pub static_extensions: Vec<String>,
  /// Path prefixes of API endpoints
  pub api_prefixes: Vec<String>,
  /// Font CDN hosts (case-insensitive)
  #[serde(deserialize_with = "deserialize_lowercase_set")]
  pub external_hosts: BTreeSet<String>,
}

impl Default for RoutesConfig {
  fn default() -> Self {
    Self {
      static_markers: ["/_next/static/", "/static/", "/images/", "/fonts/"]
        .map(String::from)
        .to_vec(),
      static_extensions: [".css", ".js", ".woff2", ".woff"].map(String::from).to_vec(),
      api_prefixes: ["/api/auth", "/api/applications", "/api/fellows"]
        .map(String::from)
        .to_vec(),
      external_hosts: ["fonts.googleapis.com", "fonts.gstatic.com"]
        .map(String::from)
        .into_iter()
        .collect(),
    }
  }
}

fn deserialize_lowercase_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(v.into_iter().map(|s| s.to_lowercase()).collect())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
  /// How long a health report is reused before the origin is probed again
  pub ttl_secs: u64,
}

impl Default for HealthConfig {
  fn default() -> Self {
    Self { ttl_secs: 30 }
  }
}

impl HealthConfig {
  /// `ttl_secs` as a duration, rejecting values chrono cannot represent.
  pub fn ttl(&self) -> Result<chrono::Duration> {
    i64::try_from(self.ttl_secs)
      .ok()
      .and_then(chrono::Duration::try_seconds)
      .ok_or_else(|| eyre!("health.ttl_secs is out of range: {}", self.ttl_secs))
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Default filter when `RUST_LOG` is unset
  pub level: String,
  /// Also write logs to this file
  pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
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
  /// 2. ./connectome-offline.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/connectome-offline/config.yaml
  ///
  /// Without any file the built-in defaults are used.
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
    let local = PathBuf::from("connectome-offline.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("connectome-offline").join("config.yaml");
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

  fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// The configured origin, required by anything that talks to the network.
  pub fn origin(&self) -> Result<&Url> {
    self.origin.as_ref().ok_or_else(|| {
      eyre!("No origin configured. Set `origin` in the config file or pass --origin.")
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_yaml_uses_defaults() {
    let config = Config::from_yaml("{}").unwrap();
    assert_eq!(config.cache.prefix, "snu-connectome");
    assert_eq!(config.cache.version, "v1");
    assert_eq!(config.cache.max_dynamic_entries, 50);
    assert_eq!(config.precache.len(), 5);
    assert!(config.routes.external_hosts.contains("fonts.gstatic.com"));
    assert!(config.origin().is_err());
  }

  #[test]
  fn test_partial_sections_keep_other_defaults() {
    let config = Config::from_yaml(
      r#"
origin: https://connectome.example.org
cache:
  version: v2
routes:
  external_hosts: [Fonts.Example.COM]
"#,
    )
    .unwrap();

    assert_eq!(config.origin().unwrap().host_str(), Some("connectome.example.org"));
    assert_eq!(config.cache.version, "v2");
    assert_eq!(config.cache.prefix, "snu-connectome");
    assert_eq!(
      config.routes.external_hosts.iter().collect::<Vec<_>>(),
      vec!["fonts.example.com"]
    );
    assert_eq!(config.routes.api_prefixes.len(), 3);
  }

  #[test]
  fn test_health_ttl_range() {
    let config = Config::from_yaml("health:\n  ttl_secs: 45\n").unwrap();
    assert_eq!(config.health.ttl().unwrap(), chrono::Duration::seconds(45));

    let huge = HealthConfig {
      ttl_secs: u64::MAX,
    };
    assert!(huge.ttl().is_err());

    let overflows_millis = HealthConfig {
      ttl_secs: i64::MAX as u64,
    };
    assert!(overflows_millis.ttl().is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    assert!(Config::load(Some(Path::new("/definitely/not/here.yaml"))).is_err());
  }
}
