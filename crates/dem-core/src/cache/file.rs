//! Package cache persisted as JSON.
//!
//! The record lives at `<cache_dir>/installed.json`:
//! - Unix: `$XDG_DATA_HOME/dem` (fallback: `~/.local/share/dem`)
//! - Windows: `%LOCALAPPDATA%\dem`
//!
//! Every write goes through a temp file and a rename so a crash never leaves
//! a half-written record behind.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::{InstalledPackage, PackageCache};
use crate::config::DemConfig;

const CACHE_FILE: &str = "installed.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    #[serde(default)]
    packages: BTreeMap<String, InstalledPackage>,
}

#[derive(Debug, Default)]
struct State {
    installed: BTreeMap<String, InstalledPackage>,
    reserved: HashSet<String>,
}

/// Cache backed by a JSON file, surviving across runs.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    state: Mutex<State>,
}

impl FileCache {
    /// Default cache directory for the current user.
    pub fn default_dir() -> anyhow::Result<PathBuf> {
        let base = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine local data directory"))?;
        Ok(base.join("dem"))
    }

    /// Open the cache in the configured `cache_dir`, or [`Self::default_dir`].
    pub fn from_config(config: &DemConfig) -> anyhow::Result<Self> {
        let dir = match &config.cache_dir {
            Some(dir) => dir.clone(),
            None => Self::default_dir()?,
        };
        Self::open(dir)
    }

    /// Open the cache in `dir`, loading any existing record.
    ///
    /// A missing file is an empty cache.
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = dir.as_ref().join(CACHE_FILE);
        let installed = Self::load(&path)?;
        tracing::debug!(
            path = %path.display(),
            packages = installed.len(),
            "loaded package cache"
        );
        Ok(Self {
            path,
            state: Mutex::new(State {
                installed,
                reserved: HashSet::new(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<InstalledPackage> {
        self.lock().installed.get(name).cloned()
    }

    /// All recorded packages, sorted by name.
    pub fn installed(&self) -> Vec<InstalledPackage> {
        self.lock().installed.values().cloned().collect()
    }

    /// Drop the record for `name` so the next run fetches it again.
    ///
    /// Returns the removed record, if there was one.
    pub fn forget(&self, name: &str) -> anyhow::Result<Option<InstalledPackage>> {
        let mut state = self.lock();
        let removed = state.installed.remove(name);
        if removed.is_some() {
            self.save(&state.installed)?;
        }
        Ok(removed)
    }

    fn load(path: &Path) -> anyhow::Result<BTreeMap<String, InstalledPackage>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read package cache: {}", path.display()))?;
        let file: CacheFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse package cache: {}", path.display()))?;
        if file.version != FORMAT_VERSION {
            anyhow::bail!(
                "Unsupported package cache version {} in {}",
                file.version,
                path.display()
            );
        }
        Ok(file.packages)
    }

    fn save(&self, installed: &BTreeMap<String, InstalledPackage>) -> anyhow::Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Package cache path has no parent"))?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;

        let file = CacheFile {
            version: FORMAT_VERSION,
            packages: installed.clone(),
        };
        let bytes =
            serde_json::to_vec_pretty(&file).context("Failed to serialize package cache")?;

        let tmp_path = dir.join(format!("{}.{}.tmp", CACHE_FILE, std::process::id()));
        fs::write(&tmp_path, bytes)
            .with_context(|| format!("Failed to write tmp cache: {}", tmp_path.display()))?;

        // Windows rename does not replace an existing file
        if cfg!(windows) && self.path.exists() {
            fs::remove_file(&self.path).with_context(|| {
                format!("Failed to remove existing cache: {}", self.path.display())
            })?;
        }
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to rename tmp cache: {}", tmp_path.display()))?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PackageCache for FileCache {
    fn is_installed(&self, name: &str) -> bool {
        self.lock().installed.contains_key(name)
    }

    fn reserve(&self, name: &str) -> bool {
        let mut state = self.lock();
        if state.installed.contains_key(name) {
            return false;
        }
        state.reserved.insert(name.to_string())
    }

    fn release(&self, name: &str) {
        self.lock().reserved.remove(name);
    }

    fn mark_installed(&self, package: InstalledPackage) -> anyhow::Result<()> {
        let mut state = self.lock();
        let name = package.name.clone();
        let previous = state.installed.insert(name.clone(), package);
        if let Err(err) = self.save(&state.installed) {
            // Keep memory in step with disk
            match previous {
                Some(previous) => state.installed.insert(name, previous),
                None => state.installed.remove(&name),
            };
            return Err(err);
        }
        state.reserved.remove(&name);
        Ok(())
    }
}
