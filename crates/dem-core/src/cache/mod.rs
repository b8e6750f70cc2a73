//! Record of which packages are already present on disk.
//!
//! The installer only asks two things of a cache: whether a package is
//! installed, and to remember a package once it has been cloned and checked
//! out. Reservations make the check atomic so parallel workers never clone
//! the same package twice.

mod file;
mod memory;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use file::FileCache;
pub use memory::MemoryCache;

/// A package recorded as installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    /// Reference that was checked out
    pub version: String,
    pub path: PathBuf,
    pub source_url: String,
    pub installed_at: chrono::DateTime<chrono::Utc>,
}

impl InstalledPackage {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        path: impl Into<PathBuf>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            path: path.into(),
            source_url: source_url.into(),
            installed_at: chrono::Utc::now(),
        }
    }
}

/// Source of truth for "is this package already present".
pub trait PackageCache: Send + Sync {
    /// Whether `name` has been recorded as installed.
    fn is_installed(&self, name: &str) -> bool;

    /// Claim `name` for installation.
    ///
    /// Returns false when the package is installed or already claimed.
    fn reserve(&self, name: &str) -> bool;

    /// Give back a claim after an install that did not complete.
    fn release(&self, name: &str);

    /// Record a completed install and drop its claim.
    fn mark_installed(&self, package: InstalledPackage) -> anyhow::Result<()>;
}
