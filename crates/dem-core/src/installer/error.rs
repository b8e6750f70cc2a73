//! Per-package install failures.

use std::path::PathBuf;

/// Why a single package failed to install.
///
/// These never abort a batch; each ends up in the package's result.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("cannot compute install path for '{name}': {reason}")]
    InvalidDestination { name: String, reason: String },

    /// Nothing usable was left on disk; the next run retries.
    #[error("failed to clone {url} into {}", .path.display())]
    Clone {
        url: String,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The clone exists on disk but is not at the requested reference.
    #[error("cloned into {} but could not check out '{reference}'", .path.display())]
    Checkout {
        reference: String,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Checked out but the cache could not record it.
    #[error("installed '{name}' but failed to record it in the cache")]
    Record {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl InstallError {
    /// Directory left behind by the failed install, if any.
    pub fn leftover_path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Checkout { path, .. } => Some(path),
            _ => None,
        }
    }
}
