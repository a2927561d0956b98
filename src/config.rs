// ABOUTME: Client configuration loaded from an optional TOML file and the environment
// ABOUTME: Holds the backend location and the polling cadence and timeouts

//! Configuration for talking to the processing backend.
//!
//! ```toml
//! backend_url = "http://localhost:8000"
//! poll_interval_ms = 1000
//! query_timeout_ms = 5000
//! request_timeout_secs = 30
//! max_consecutive_errors = 10
//! ```
//!
//! Every key is optional. `EEGMUSIC_BACKEND_URL` overrides the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const BACKEND_URL_ENV: &str = "EEGMUSIC_BACKEND_URL";
const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base location of the backend; relative artifact paths resolve against it.
    pub backend_url: String,
    pub poll_interval_ms: u64,
    /// Upper bound for a single status query.
    pub query_timeout_ms: u64,
    /// Timeout for uploads, downloads and other one-shot requests.
    pub request_timeout_secs: u64,
    /// Failed status checks in a row before the poller gives up.
    pub max_consecutive_errors: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            poll_interval_ms: 1000,
            query_timeout_ms: 5000,
            request_timeout_secs: 30,
            max_consecutive_errors: 10,
        }
    }
}

impl ClientConfig {
    /// Load from `path` if given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            config.set_backend_url(url);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(contents)?;
        config.backend_url = normalize_base(&config.backend_url);
        Ok(config)
    }

    pub fn set_backend_url(&mut self, url: impl AsRef<str>) {
        self.backend_url = normalize_base(url.as_ref());
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.backend_url.starts_with("http://") || self.backend_url.starts_with("https://")) {
            anyhow::bail!(
                "Backend URL must start with http:// or https://, got '{}'",
                self.backend_url
            );
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }
        if self.query_timeout_ms == 0 {
            anyhow::bail!("query_timeout_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn normalize_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
