use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::CacheManifest;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the app is served from, e.g. https://vertretung.example.org
  pub origin: Url,
  /// Path of the worker script, reported as the analytics page URL
  #[serde(default = "default_script_path")]
  pub script_path: String,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub notifications: NotificationsConfig,
  #[serde(default)]
  pub analytics: AnalyticsConfig,
  /// SQLite database path (defaults to $XDG_DATA_HOME/vplan-worker/worker.db)
  pub database: Option<PathBuf>,
}

fn default_script_path() -> String {
  "/sw.js".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Cache name, doubles as the worker version
  #[serde(default = "default_cache_name")]
  pub name: String,
  /// Where `/` redirects to; unset or empty disables the redirect
  pub default_plan_path: Option<String>,
  #[serde(default = "default_plan_paths", deserialize_with = "deserialize_path_set")]
  pub plan_paths: BTreeSet<String>,
  #[serde(default = "default_asset_paths", deserialize_with = "deserialize_path_set")]
  pub asset_paths: BTreeSet<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      name: default_cache_name(),
      default_plan_path: None,
      plan_paths: default_plan_paths(),
      asset_paths: default_asset_paths(),
    }
  }
}

fn default_cache_name() -> String {
  "gawvertretung-v1".to_string()
}

fn default_plan_paths() -> BTreeSet<String> {
  ["/students/", "/teachers/"].into_iter().map(String::from).collect()
}

fn default_asset_paths() -> BTreeSet<String> {
  [
    "/assets/style/main.css",
    "/assets/js/substitutions.js",
    "/assets/js/timetables.js",
    "/assets/ferien/style.css",
    "/assets/ferien/script.js",
  ]
  .into_iter()
  .map(String::from)
  .collect()
}

/// Paths must be absolute; they are compared verbatim with request pathnames.
fn deserialize_path_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  if let Some(bad) = v.iter().find(|p| !p.starts_with('/')) {
    return Err(serde::de::Error::custom(format!(
      "path '{}' must start with '/'",
      bad
    )));
  }
  Ok(v.into_iter().collect())
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
  #[serde(default = "default_icon")]
  pub icon: String,
  #[serde(default = "default_badge")]
  pub badge: String,
  #[serde(default = "default_lang")]
  pub lang: String,
  /// Vibration pattern for substitution updates (milliseconds)
  #[serde(default = "default_vibrate")]
  pub vibrate: Vec<u32>,
}

impl Default for NotificationsConfig {
  fn default() -> Self {
    Self {
      icon: default_icon(),
      badge: default_badge(),
      lang: default_lang(),
      vibrate: default_vibrate(),
    }
  }
}

fn default_icon() -> String {
  "android-chrome-512x512.png".to_string()
}

fn default_badge() -> String {
  "monochrome-96x96.png".to_string()
}

fn default_lang() -> String {
  "de".to_string()
}

fn default_vibrate() -> Vec<u32> {
  vec![300, 100, 400]
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
  /// Site domain registered with the analytics service; reporting is off when unset
  pub domain: Option<String>,
  #[serde(default = "default_analytics_endpoint")]
  pub endpoint: String,
}

impl Default for AnalyticsConfig {
  fn default() -> Self {
    Self {
      domain: None,
      endpoint: default_analytics_endpoint(),
    }
  }
}

fn default_analytics_endpoint() -> String {
  "https://plausible.io/api/event".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./vplan-worker.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/vplan-worker/config.yaml
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
        "No configuration file found. Create one at ~/.config/vplan-worker/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("vplan-worker.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("vplan-worker").join("config.yaml");
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
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    Ok(config)
  }

  /// Database path, overridable with the VPLAN_WORKER_DB environment variable.
  pub fn database_path(&self) -> Option<PathBuf> {
    std::env::var_os("VPLAN_WORKER_DB")
      .map(PathBuf::from)
      .or_else(|| self.database.clone())
  }

  pub fn manifest(&self) -> CacheManifest {
    CacheManifest::new(
      self.cache.plan_paths.iter().cloned(),
      self.cache.asset_paths.iter().cloned(),
    )
    .with_default_plan_path(self.cache.default_plan_path.clone())
  }

  /// Absolute URL of the worker script.
  pub fn script_url(&self) -> Result<Url> {
    self
      .origin
      .join(&self.script_path)
      .map_err(|e| eyre!("Invalid script path '{}': {}", self.script_path, e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml("origin: https://plan.example\n").unwrap();
    assert_eq!(config.cache.name, "gawvertretung-v1");
    assert!(config.cache.plan_paths.contains("/students/"));
    assert!(config.cache.asset_paths.contains("/assets/ferien/script.js"));
    assert_eq!(config.notifications.vibrate, vec![300, 100, 400]);
    assert_eq!(config.notifications.lang, "de");
    assert!(config.analytics.domain.is_none());
    assert_eq!(
      config.script_url().unwrap().as_str(),
      "https://plan.example/sw.js"
    );
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
origin: https://vertretung.example.org
cache:
  name: vplan-v7
  default_plan_path: /students/
  plan_paths: [/students/, /teachers/, /students/]
  asset_paths:
    - /assets/style/main.css
analytics:
  domain: vertretung.example.org
  endpoint: https://stats.example.org/api/event
notifications:
  icon: icon.png
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let manifest = config.manifest();
    assert_eq!(manifest.plan_paths.len(), 2);
    assert_eq!(manifest.asset_paths.len(), 1);
    assert_eq!(manifest.default_plan_path.as_deref(), Some("/students/"));
    assert_eq!(config.cache.name, "vplan-v7");
    assert_eq!(config.notifications.icon, "icon.png");
    assert_eq!(config.notifications.badge, "monochrome-96x96.png");
    assert_eq!(config.analytics.endpoint, "https://stats.example.org/api/event");
  }

  #[test]
  fn test_relative_paths_are_rejected() {
    let yaml = "origin: https://plan.example\ncache:\n  plan_paths: [students/]\n";
    assert!(Config::from_yaml(yaml).is_err());
  }

  #[test]
  fn test_empty_default_plan_path_disables_redirect() {
    let yaml = "origin: https://plan.example\ncache:\n  default_plan_path: \"\"\n";
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.manifest().default_plan_path, None);
  }
}
