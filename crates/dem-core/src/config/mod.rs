//! Tool configuration (`dem.toml`).
//!
//! Holds the settings the installer and the environment bootstrap need:
//! an optional HTTP proxy, the clone timeout, the worker count and an
//! optional cache directory override.

mod parser;
mod store;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use parser::{parse_dem_toml, parse_dem_toml_str, to_toml};
pub use store::{CONFIG_FILE, ConfigStore};

/// Default clone timeout in seconds.
pub const DEFAULT_CLONE_TIMEOUT_SECS: u64 = 300;

/// Settings loaded from `dem.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemConfig {
    /// Proxy used for clones and for installing the tool into an environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,

    /// Abort a clone after this many seconds
    pub clone_timeout_secs: u64,

    /// Number of packages cloned at once
    pub jobs: usize,

    /// Where the package cache is kept (defaults to the user data directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for DemConfig {
    fn default() -> Self {
        Self {
            http_proxy: None,
            clone_timeout_secs: DEFAULT_CLONE_TIMEOUT_SECS,
            jobs: 1,
            cache_dir: None,
        }
    }
}

impl DemConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_http_proxy(&self) -> bool {
        self.http_proxy
            .as_deref()
            .is_some_and(|proxy| !proxy.trim().is_empty())
    }

    /// The configured proxy, or an empty string when there is none.
    pub fn http_proxy(&self) -> &str {
        self.http_proxy.as_deref().map(str::trim).unwrap_or_default()
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.has_http_proxy() {
            url::Url::parse(self.http_proxy()).map_err(|e| {
                anyhow::anyhow!("Invalid http_proxy '{}': {}", self.http_proxy(), e)
            })?;
        }
        if self.jobs == 0 {
            anyhow::bail!("jobs must be at least 1");
        }
        if self.clone_timeout_secs == 0 {
            anyhow::bail!("clone_timeout_secs must be at least 1");
        }
        Ok(())
    }
}
