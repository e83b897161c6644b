//! Application configuration management.
//!
//! Holds the backend endpoint, the signed-in user, the proxy's deployment
//! settings (origin, build tag, shell routes) and a few tuning knobs.
//!
//! Configuration is stored at `~/.config/gymcache/config.json`. Values can
//! be overridden from the environment (or a `.env` file loaded by the
//! binary) through `GYMCACHE_*` variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::proxy::policy::default_shell_routes;
use crate::proxy::{CacheVersionTag, ProxyConfig};
use crate::resolver::banner::DEFAULT_STALE_AFTER_HOURS;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "gymcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_PREFIX: &str = "GYMCACHE_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend_url: Option<String>,
    /// Public (anon) key sent with every backend request.
    pub api_key: Option<String>,
    pub user_id: Option<String>,
    pub app_origin: String,
    /// Build tag namespacing proxy caches. Defaults to the crate version.
    pub cache_version: Option<String>,
    pub shell_routes: Vec<String>,
    pub fallback_route: String,
    pub stale_after_hours: i64,
    pub request_timeout_secs: u64,
    /// When set, logs are also written to a daily rolling file here.
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: None,
            api_key: None,
            user_id: None,
            app_origin: "http://localhost:3000".to_string(),
            cache_version: None,
            shell_routes: default_shell_routes(),
            fallback_route: "/dashboard".to_string(),
            stale_after_hours: DEFAULT_STALE_AFTER_HOURS,
            request_timeout_secs: 30,
            log_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Directory of the persistent store, one per user.
    pub fn store_dir(&self) -> Result<PathBuf> {
        let mut path = self.cache_dir()?.join("store");
        if let Some(ref user) = self.user_id {
            path = path.join(user);
        }
        Ok(path)
    }

    /// Apply `GYMCACHE_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty())
        };

        if let Some(v) = var("BACKEND_URL") {
            self.backend_url = Some(v);
        }
        if let Some(v) = var("API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = var("USER_ID") {
            self.user_id = Some(v);
        }
        if let Some(v) = var("APP_ORIGIN") {
            self.app_origin = v;
        }
        if let Some(v) = var("CACHE_VERSION") {
            self.cache_version = Some(v);
        }
        if let Some(hours) = var("STALE_AFTER_HOURS").and_then(|v| v.parse().ok()) {
            self.stale_after_hours = hours;
        }
        if let Some(v) = var("LOG_DIR") {
            self.log_dir = Some(PathBuf::from(v));
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Out-of-range or non-positive hours fall back to the default.
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::try_hours(self.stale_after_hours)
            .filter(|span| *span > chrono::Duration::zero())
            .unwrap_or_else(|| chrono::Duration::hours(DEFAULT_STALE_AFTER_HOURS))
    }

    pub fn version_tag(&self) -> CacheVersionTag {
        match &self.cache_version {
            Some(tag) => CacheVersionTag::new(tag.clone()),
            None => CacheVersionTag::from_build(),
        }
    }

    /// Proxy settings for the configured deployment.
    pub fn proxy_config(&self) -> Result<ProxyConfig> {
        let app_origin = Url::parse(&self.app_origin)
            .with_context(|| format!("Invalid app origin: {}", self.app_origin))?;
        let mut config = ProxyConfig::new(self.version_tag(), app_origin)
            .with_shell_routes(self.shell_routes.clone(), self.fallback_route.clone());

        if let Some(ref backend) = self.backend_url {
            let backend = Url::parse(backend)
                .with_context(|| format!("Invalid backend URL: {}", backend))?;
            config = config.with_backend(backend);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.shell_routes.len(), 6);
        assert_eq!(config.fallback_route, "/dashboard");
        assert_eq!(config.stale_after_hours, 24);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            backend_url: Some("https://db.example.co".to_string()),
            user_id: Some("u-1".to_string()),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.backend_url.as_deref(), Some("https://db.example.co"));
        assert_eq!(loaded.user_id.as_deref(), Some("u-1"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"user_id": "u-9"}"#).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.user_id.as_deref(), Some("u-9"));
        assert_eq!(loaded.request_timeout_secs, 30);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GYMCACHE_BACKEND_URL", "https://db.example.co"),
            ("GYMCACHE_USER_ID", "u-2"),
            ("GYMCACHE_STALE_AFTER_HOURS", "6"),
            ("GYMCACHE_API_KEY", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.backend_url.as_deref(), Some("https://db.example.co"));
        assert_eq!(config.user_id.as_deref(), Some("u-2"));
        assert_eq!(config.stale_after_hours, 6);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_stale_after_rejects_unusable_hours() {
        let mut config = Config::default();
        assert_eq!(config.stale_after(), chrono::Duration::hours(24));

        config.stale_after_hours = i64::MAX;
        assert_eq!(config.stale_after(), chrono::Duration::hours(24));
        config.stale_after_hours = -3;
        assert_eq!(config.stale_after(), chrono::Duration::hours(24));
        config.stale_after_hours = 6;
        assert_eq!(config.stale_after(), chrono::Duration::hours(6));
    }

    #[test]
    fn test_proxy_config() {
        let config = Config {
            backend_url: Some("https://db.example.co".to_string()),
            app_origin: "https://gym.example".to_string(),
            cache_version: Some("20261019".to_string()),
            ..Default::default()
        };
        let proxy = config.proxy_config().unwrap();
        assert_eq!(proxy.version.static_cache(), "gym-static-20261019");
        assert_eq!(proxy.backend_origin.as_ref().unwrap().as_str(), "https://db.example.co/");
        assert_eq!(proxy.shell_urls().len(), 6);

        let bad = Config {
            app_origin: "not a url".to_string(),
            ..Default::default()
        };
        assert!(bad.proxy_config().is_err());
    }
}
