//! Runtime configuration loaded from a JSON file.

use crate::error::SyncError;
use log::{info, warn};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Base URL of the report service API, e.g. `https://host/api/2.0/fo/`
    #[serde(alias = "url")]
    pub service_url: String,

    #[serde(flatten)]
    pub credentials: Credentials,

    /// Titles must start with one of these to be catalogued
    #[serde(alias = "prefixes", default)]
    pub title_prefixes: Vec<String>,

    /// Output formats eligible for download (case-insensitive)
    #[serde(alias = "report_formats", default)]
    pub allowed_output_formats: Vec<String>,

    #[serde(alias = "reload_interval")]
    pub poll_interval_minutes: u64,

    #[serde(default = "default_worker_count")]
    pub download_worker_count: usize,

    /// Per-request limit. Report fetches are only bounded per chunk, so a
    /// large report that keeps streaming is never cut off.
    #[serde(default = "default_timeout_seconds")]
    pub download_timeout_seconds: u64,

    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

fn default_worker_count() -> usize {
    4
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

impl Config {
    /// Reads the file without validating it; call [`Config::validate`] once
    /// command-line overrides have been applied.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        info!("Loading config from '{}'", path.display());
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, SyncError> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        let url = reqwest::Url::parse(&self.service_url)
            .map_err(|e| SyncError::Config(format!("service_url {:?}: {}", self.service_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::Config(format!(
                "service_url must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.credentials.username.is_empty() {
            return Err(SyncError::Config("username must not be empty".into()));
        }
        if self.poll_interval_minutes == 0 {
            return Err(SyncError::Config("poll_interval_minutes must be > 0".into()));
        }
        if self.download_worker_count == 0 {
            return Err(SyncError::Config("download_worker_count must be >= 1".into()));
        }
        if self.download_timeout_seconds == 0 {
            return Err(SyncError::Config("download_timeout_seconds must be > 0".into()));
        }
        if self.title_prefixes.is_empty() {
            warn!("No title prefixes configured, no report will ever be catalogued");
        }
        if self.allowed_output_formats.is_empty() {
            warn!("No output formats allowed, no report will ever be downloaded");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes * 60)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_seconds)
    }
}
