//! Version-control capability used by the installer.
//!
//! The installer only needs two operations: clone a remote into a directory,
//! and check out a reference in the clone. [`GitBackend`] provides them with
//! libgit2; tests substitute recording fakes.

mod git;

use std::path::Path;

pub use git::{DEFAULT_CLONE_TIMEOUT, GitBackend, GitRepository};

/// A local clone that can move its working tree to another reference.
pub trait RepositoryHandle {
    /// Check out `reference` (branch, tag or commit).
    fn checkout(&mut self, reference: &str) -> anyhow::Result<()>;
}

/// Something that can clone remotes.
pub trait VersionControl: Send + Sync {
    /// Clone `url` into `destination`, returning a handle to the new clone.
    fn clone_repository(
        &self,
        url: &str,
        destination: &Path,
    ) -> anyhow::Result<Box<dyn RepositoryHandle>>;
}
