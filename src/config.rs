use crate::registry::ListEndpoint;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "http://localhost:8000";

/// Settings read from `config.toml`. Every field has a default, so a missing
/// file or a partial one is fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend base URL, e.g. `http://localhost:8000`.
    pub api_base: String,
    pub list_endpoint: ListEndpoint,
    /// Skip the backend entirely and work from the cache.
    pub offline: bool,
    /// `~` is expanded. Empty means the platform data directory.
    pub cache_path: String,
    /// How often `watch` re-lists to pick up new tags.
    pub refresh_interval_secs: u64,
    /// Unset leaves the HTTP client's default in place.
    pub request_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            list_endpoint: ListEndpoint::default(),
            offline: false,
            cache_path: String::new(),
            refresh_interval_secs: 30,
            request_timeout_secs: None,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "tidal")
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`. A missing
    /// default file yields defaults; a missing explicit file is an error.
    /// `TIDAL_API_BASE` and `TIDAL_OFFLINE` override the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(base) = var("TIDAL_API_BASE").filter(|v| !v.trim().is_empty()) {
            self.api_base = base.trim().to_string();
        }
        if let Some(offline) = var("TIDAL_OFFLINE") {
            self.offline = matches!(offline.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        if self.cache_path.trim().is_empty() {
            return project_dirs()
                .map(|dirs| dirs.data_dir().join("cache.db"))
                .unwrap_or_else(|| PathBuf::from("tidal-cache.db"));
        }
        PathBuf::from(shellexpand::tilde(&self.cache_path).into_owned())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}
