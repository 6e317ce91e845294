// src/config.rs

use crate::error::{Error, Result};
use crate::models::Service;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a config file when no path is given.
pub const CONFIG_ENV: &str = "MANGASHELF_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub catalog_base_url: String,
    pub covers_base_url: String,
    pub debrid_base_url: String,
    pub database_path: PathBuf,
    /// Downloaded chapter pages land under `<cache_dir>/<manga>/<chapter>/`.
    pub cache_dir: PathBuf,
    /// Preferred translation language for chapter listings.
    pub language: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_concurrent_fetches: usize,
    /// `tracing` filter directive, e.g. "info" or "mangashelf=debug".
    pub log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debrid_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_base_url: "https://api.mangadex.org".into(),
            covers_base_url: "https://uploads.mangadex.org/covers".into(),
            debrid_base_url: "https://api.real-debrid.com/rest/1.0".into(),
            database_path: PathBuf::from("mangashelf.db"),
            cache_dir: PathBuf::from("cache"),
            language: "en".into(),
            user_agent: concat!("mangashelf/", env!("CARGO_PKG_VERSION")).into(),
            timeout_secs: 30,
            max_concurrent_fetches: 4,
            log_level: "info".into(),
            catalog_token: None,
            debrid_token: None,
        }
    }
}

impl Config {
    /// Load from `path`, or from `$MANGASHELF_CONFIG`, or fall back to defaults.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `MANGASHELF_*` overrides through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("MANGASHELF_CATALOG_URL") {
            self.catalog_base_url = url;
        }
        if let Some(url) = non_empty("MANGASHELF_DEBRID_URL") {
            self.debrid_base_url = url;
        }
        if let Some(token) = non_empty("MANGASHELF_CATALOG_TOKEN") {
            self.catalog_token = Some(token);
        }
        if let Some(token) = non_empty("MANGASHELF_DEBRID_TOKEN") {
            self.debrid_token = Some(token);
        }
        if let Some(level) = non_empty("MANGASHELF_LOG") {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("catalog_base_url", &self.catalog_base_url),
            ("covers_base_url", &self.covers_base_url),
            ("debrid_base_url", &self.debrid_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!("{name} must be an http(s) URL, got {url:?}")));
            }
        }
        if self.max_concurrent_fetches == 0 {
            return Err(Error::Config("max_concurrent_fetches must be at least 1".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Token supplied through configuration, which takes precedence over the store.
    pub fn token_override(&self, service: Service) -> Option<&str> {
        match service {
            Service::Catalog => self.catalog_token.as_deref(),
            Service::Debrid => self.debrid_token.as_deref(),
        }
    }
}
