//! libgit2-backed clone and checkout.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{BranchType, FetchOptions, ProxyOptions, RemoteCallbacks, Repository};

use super::{RepositoryHandle, VersionControl};
use crate::config::DemConfig;

/// Upper bound on a single clone when nothing else is configured.
pub const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(300);

/// Clones repositories with libgit2.
#[derive(Debug, Clone)]
pub struct GitBackend {
    proxy: Option<String>,
    timeout: Duration,
}

impl Default for GitBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GitBackend {
    pub fn new() -> Self {
        Self {
            proxy: None,
            timeout: DEFAULT_CLONE_TIMEOUT,
        }
    }

    /// Create a backend using the proxy and timeout from `config`.
    pub fn from_config(config: &DemConfig) -> Self {
        Self {
            proxy: config.has_http_proxy().then(|| config.http_proxy().to_string()),
            timeout: config.clone_timeout(),
        }
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Clone `url` into `destination`.
    ///
    /// The transfer is aborted once the configured timeout has elapsed, and
    /// whatever was written to `destination` is removed.
    pub fn clone_into(&self, url: &str, destination: &Path) -> anyhow::Result<GitRepository> {
        if destination.exists() && !is_empty_dir(destination)? {
            anyhow::bail!(
                "Clone destination already exists and is not empty: {}",
                destination.display()
            );
        }
        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create destination directory: {}", parent.display())
            })?;
        }

        apply_server_timeouts(self.timeout);

        let deadline = Instant::now() + self.timeout;
        let expired = Arc::new(AtomicBool::new(false));
        let mut callbacks = RemoteCallbacks::new();
        {
            let expired = Arc::clone(&expired);
            callbacks.transfer_progress(move |_| within_deadline(deadline, &expired));
        }
        {
            let expired = Arc::clone(&expired);
            callbacks.sideband_progress(move |_| within_deadline(deadline, &expired));
        }
        {
            let expired = Arc::clone(&expired);
            callbacks.update_tips(move |_, _, _| within_deadline(deadline, &expired));
        }

        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(callbacks);
        if let Some(proxy) = &self.proxy {
            let mut proxy_options = ProxyOptions::new();
            proxy_options.url(proxy);
            fetch.proxy_options(proxy_options);
        }

        let result = RepoBuilder::new().fetch_options(fetch).clone(url, destination);

        // A clone that only finished after the deadline is discarded too
        if expired.load(Ordering::SeqCst) || Instant::now() >= deadline {
            drop(result);
            let _ = std::fs::remove_dir_all(destination);
            anyhow::bail!(
                "Clone of {} timed out after {}s",
                url,
                self.timeout.as_secs()
            );
        }

        let repo = result
            .with_context(|| format!("Failed to clone {} into {}", url, destination.display()))?;

        Ok(GitRepository {
            repo,
            path: destination.to_path_buf(),
        })
    }
}

impl VersionControl for GitBackend {
    fn clone_repository(
        &self,
        url: &str,
        destination: &Path,
    ) -> anyhow::Result<Box<dyn RepositoryHandle>> {
        Ok(Box::new(self.clone_into(url, destination)?))
    }
}

/// A clone on disk.
pub struct GitRepository {
    repo: Repository,
    path: PathBuf,
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository")
            .field("path", &self.path)
            .finish()
    }
}

impl GitRepository {
    /// Open an existing clone.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let repo = Repository::open(&path)
            .with_context(|| format!("Failed to open repository: {}", path.display()))?;
        Ok(Self { repo, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Commit currently checked out.
    pub fn head_commit(&self) -> anyhow::Result<String> {
        let commit = self
            .repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .with_context(|| format!("Failed to resolve HEAD in {}", self.path.display()))?;
        Ok(commit.id().to_string())
    }

    /// Local branch HEAD points at, or `None` when detached.
    pub fn current_branch(&self) -> anyhow::Result<Option<String>> {
        if self.repo.head_detached()? {
            return Ok(None);
        }
        let head = self.repo.head()?;
        Ok(head.shorthand().map(str::to_string))
    }

    /// Resolve `reference` as given, then as a remote branch, then as a tag.
    fn resolve(
        &self,
        reference: &str,
    ) -> anyhow::Result<(git2::Object<'_>, Option<git2::Reference<'_>>)> {
        let candidates = [
            reference.to_string(),
            format!("origin/{reference}"),
            format!("refs/tags/{reference}"),
        ];
        for candidate in &candidates {
            if let Ok(found) = self.repo.revparse_ext(candidate) {
                return Ok(found);
            }
        }
        anyhow::bail!(
            "Reference '{}' not found in {}",
            reference,
            self.path.display()
        )
    }
}

impl RepositoryHandle for GitRepository {
    fn checkout(&mut self, reference: &str) -> anyhow::Result<()> {
        let (object, found) = self.resolve(reference)?;
        let commit = object
            .peel_to_commit()
            .with_context(|| format!("Reference '{}' does not point at a commit", reference))?;

        let mut options = CheckoutBuilder::new();
        options.force();
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut options))
            .with_context(|| format!("Failed to check out '{}'", reference))?;

        match found {
            Some(found) if found.is_branch() => {
                let name = found
                    .name()
                    .ok_or_else(|| anyhow::anyhow!("Branch name is not valid UTF-8"))?;
                self.repo.set_head(name)?;
            }
            Some(found) if found.is_remote() => {
                let upstream = found
                    .shorthand()
                    .ok_or_else(|| anyhow::anyhow!("Branch name is not valid UTF-8"))?;
                let local = upstream.strip_prefix("origin/").unwrap_or(upstream);
                match self.repo.find_branch(local, BranchType::Local) {
                    Ok(existing) if existing.get().target() == Some(commit.id()) => {
                        let name = existing
                            .get()
                            .name()
                            .ok_or_else(|| anyhow::anyhow!("Branch name is not valid UTF-8"))?;
                        self.repo.set_head(name)?;
                    }
                    // Local branch has diverged; leave it alone
                    Ok(_) => self.repo.set_head_detached(commit.id())?,
                    Err(_) => {
                        let mut branch = self.repo.branch(local, &commit, false)?;
                        branch.set_upstream(Some(upstream))?;
                        let name = branch
                            .get()
                            .name()
                            .ok_or_else(|| anyhow::anyhow!("Branch name is not valid UTF-8"))?;
                        self.repo.set_head(name)?;
                    }
                }
            }
            _ => self.repo.set_head_detached(commit.id())?,
        }

        tracing::debug!(
            path = %self.path.display(),
            reference,
            commit = %commit.id(),
            "checked out"
        );
        Ok(())
    }
}

static SERVER_TIMEOUTS: Once = Once::new();

/// Floor for the socket timeouts, so a tiny clone budget never starves
/// later clones in the same process.
const MIN_SERVER_TIMEOUT: Duration = Duration::from_secs(1);

/// Bound libgit2's connect and read phases, which no callback can interrupt.
///
/// These are process-wide; the first clone sets them.
fn apply_server_timeouts(timeout: Duration) {
    SERVER_TIMEOUTS.call_once(|| {
        let millis = i32::try_from(timeout.max(MIN_SERVER_TIMEOUT).as_millis())
            .unwrap_or(i32::MAX);
        // SAFETY: writes a libgit2 global; `call_once` serializes the write and
        // every clone in this crate waits for it before touching libgit2.
        let applied = unsafe {
            git2::opts::set_server_connect_timeout_in_milliseconds(millis)
                .and_then(|()| git2::opts::set_server_timeout_in_milliseconds(millis))
        };
        if let Err(err) = applied {
            tracing::warn!(error = %err, "failed to set git server timeouts");
        }
    });
}

/// Whether the clone may keep going; records the abort in `expired` when not.
pub(super) fn within_deadline(deadline: Instant, expired: &AtomicBool) -> bool {
    if Instant::now() < deadline {
        return true;
    }
    expired.store(true, Ordering::SeqCst);
    false
}

fn is_empty_dir(path: &Path) -> anyhow::Result<bool> {
    if !path.is_dir() {
        return Ok(false);
    }
    let mut entries = std::fs::read_dir(path)
        .with_context(|| format!("Failed to read directory: {}", path.display()))?;
    Ok(entries.next().is_none())
}
