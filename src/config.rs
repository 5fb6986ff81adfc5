use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::models::ProbeKind;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub admin: Option<AdminConfig>,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub dns: DnsChoice,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_title() -> String { "Service Status".into() }
fn default_max_concurrency() -> usize { 64 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default, rename = "type")]
    pub service_type: Option<String>,
    #[serde(default)]
    pub url: String,
}

fn default_service_name() -> String { "Unknown Service".into() }

impl ServiceConfig {
    pub fn kind(&self) -> ProbeKind {
        ProbeKind::from_declared(self.service_type.as_deref())
    }
}

/// Credentials and service list for the admin view.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Timeouts {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_ms: u64,
}

fn default_connect_timeout() -> u64 { 5000 }
fn default_read_timeout() -> u64 { 5000 }
fn default_http_timeout() -> u64 { 10000 }

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: default_read_timeout(),
            http_timeout_ms: default_http_timeout(),
        }
    }
}

impl Timeouts {
    pub fn connect(&self) -> Duration { Duration::from_millis(self.connect_timeout_ms) }
    pub fn read(&self) -> Duration { Duration::from_millis(self.read_timeout_ms) }
    pub fn http(&self) -> Duration { Duration::from_millis(self.http_timeout_ms) }
}

/// Upstream used for name resolution.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DnsChoice {
    #[default]
    System,
    Cloudflare,
    Google,
}

impl Config {
    /// Reads YAML, or JSON when the file ends in `.json`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config: Config = if is_json {
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::from_yaml(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        };

        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document is a config with no services.
        if contents.trim().is_empty() {
            return Ok(serde_yaml::from_str("{}")?);
        }
        Ok(serde_yaml::from_str(contents)?)
    }
}

/// Keeps the last good config and re-reads the file on demand, so service
/// lists can be edited without a restart.
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<Config>>,
}

impl ConfigStore {
    /// Fails when the initial load fails.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = Config::load(&path)?;
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(config)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Config as of the last successful load.
    pub async fn snapshot(&self) -> Arc<Config> {
        Arc::clone(&*self.current.read().await)
    }

    /// Reloads from disk, falling back to the last good config.
    pub async fn current(&self) -> Arc<Config> {
        match Config::load(&self.path) {
            Ok(config) => {
                let config = Arc::new(config);
                *self.current.write().await = Arc::clone(&config);
                debug!(path = %self.path.display(), services = config.services.len(), "Config reloaded");
                config
            }
            Err(e) => {
                warn!(path = %self.path.display(), "Config reload failed, keeping previous: {:#}", e);
                self.snapshot().await
            }
        }
    }
}
