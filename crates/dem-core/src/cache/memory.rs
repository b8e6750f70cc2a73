//! In-process package cache.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{InstalledPackage, PackageCache};

#[derive(Debug, Default)]
struct State {
    installed: HashMap<String, InstalledPackage>,
    reserved: HashSet<String>,
}

/// Cache that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryCache {
    state: Mutex<State>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache that already knows about `names`.
    pub fn with_installed<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cache = Self::new();
        {
            let mut state = cache.lock();
            for name in names {
                let name = name.into();
                let record = InstalledPackage::new(name.clone(), "", "", "");
                state.installed.insert(name, record);
            }
        }
        cache
    }

    pub fn get(&self, name: &str) -> Option<InstalledPackage> {
        self.lock().installed.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().installed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PackageCache for MemoryCache {
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
        state.reserved.remove(&package.name);
        state.installed.insert(package.name.clone(), package);
        Ok(())
    }
}
