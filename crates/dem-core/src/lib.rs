//! dem Core Library
//!
//! Fetches a flat, already-resolved list of packages from their git remotes
//! into deterministic directories, skipping anything the package cache
//! already knows about.

pub mod cache;
pub mod config;
pub mod environment;
pub mod installer;
pub mod types;
pub mod vcs;

/// Re-exports of commonly used types
pub mod prelude {
    // Packages
    pub use crate::types::{DEFAULT_BRANCH, PackageDescriptor};

    // Cache
    pub use crate::cache::{FileCache, InstalledPackage, MemoryCache, PackageCache};

    // Installer
    pub use crate::installer::{
        InstallError, InstallOutcome, InstallReport, PackageResult, ProjectInstaller, SkipReason,
    };

    // Version control
    pub use crate::vcs::{GitBackend, GitRepository, RepositoryHandle, VersionControl};

    // Configuration
    pub use crate::config::{ConfigStore, DemConfig};

    // Environment
    pub use crate::environment::{
        BuildOutcome, Environment, EnvironmentBuilder, PythonVenvProvisioner, RuntimeProvisioner,
    };
}
