//! Config store for loading and saving dem.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{DemConfig, parser};

pub const CONFIG_FILE: &str = "dem.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Store for the user-wide config (`<config_dir>/dem/dem.toml`).
    pub fn global() -> anyhow::Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("dem");
        Ok(Self::from_path(dir.join(CONFIG_FILE)))
    }

    /// Store for `dem.toml` in a project directory.
    pub fn for_project(project_root: &Path) -> Self {
        Self::from_path(project_root.join(CONFIG_FILE))
    }

    pub fn from_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the config, or defaults when the file does not exist.
    pub fn load(&self) -> anyhow::Result<DemConfig> {
        if !self.config_path.exists() {
            return Ok(DemConfig::new());
        }
        parser::parse_dem_toml(&self.config_path)
    }

    pub fn save(&self, config: &DemConfig) -> anyhow::Result<()> {
        config.validate()?;
        let content = parser::to_toml(config).context("Failed to serialize config to TOML")?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;
        Ok(())
    }
}
