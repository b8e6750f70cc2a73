//! Fetch-or-skip for a batch of package descriptors.
//!
//! Each descriptor is handled on its own: a skip or a failure never stops the
//! rest of the batch. Per descriptor the installer
//! 1. skips it when the cache already has it,
//! 2. skips it when there is no source url,
//! 3. computes `<destination>/<name>`,
//! 4. skips it when an earlier entry with the same name already got its
//!    clone attempt in this run,
//! 5. clones the source url there,
//! 6. checks out the version (or `master`),
//! 7. records the install in the cache.

mod error;
mod report;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cache::{InstalledPackage, PackageCache};
use crate::config::DemConfig;
use crate::types::PackageDescriptor;
use crate::vcs::VersionControl;

pub use error::InstallError;
pub use report::{InstallOutcome, InstallReport, PackageResult, SkipReason};

/// Installs a list of packages into their destinations.
pub struct ProjectInstaller<'a> {
    packages: &'a [PackageDescriptor],
    cache: &'a dyn PackageCache,
    vcs: &'a dyn VersionControl,
    jobs: usize,
}

impl<'a> ProjectInstaller<'a> {
    pub fn new(
        packages: &'a [PackageDescriptor],
        cache: &'a dyn PackageCache,
        vcs: &'a dyn VersionControl,
    ) -> Self {
        Self {
            packages,
            cache,
            vcs,
            jobs: 1,
        }
    }

    /// Clone up to `jobs` packages at once. `0` is treated as `1`.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Take the worker count from `config`.
    pub fn with_config(self, config: &DemConfig) -> Self {
        self.with_jobs(config.jobs)
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Install every package, returning one result per descriptor in input order.
    pub fn install_packages(&self) -> InstallReport {
        let groups = self.group_by_name();
        let workers = self.jobs.min(groups.len());

        let results = if workers <= 1 {
            let mut attempted = HashSet::new();
            self.packages
                .iter()
                .map(|package| self.process(package, &mut attempted))
                .collect()
        } else {
            self.install_parallel(workers, &groups)
        };

        let report = InstallReport { results };
        tracing::info!(
            total = report.len(),
            installed = report.installed().count(),
            skipped = report.skipped().count(),
            failed = report.failed().count(),
            "install run finished"
        );
        report
    }

    /// Workers take whole name groups, so descriptors sharing a name are
    /// handled one after another in input order, as in a sequential run.
    fn install_parallel(&self, workers: usize, groups: &[Vec<usize>]) -> Vec<PackageResult> {
        let next = AtomicUsize::new(0);

        let mut indexed: Vec<(usize, PackageResult)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut done = Vec::new();
                        loop {
                            let group = next.fetch_add(1, Ordering::Relaxed);
                            let Some(indices) = groups.get(group) else {
                                break;
                            };
                            let mut attempted = HashSet::new();
                            for &index in indices {
                                let package = &self.packages[index];
                                done.push((index, self.process(package, &mut attempted)));
                            }
                        }
                        done
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(done) => done,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, result)| result).collect()
    }

    /// Descriptor indices grouped by package name, groups in first-seen order.
    fn group_by_name(&self) -> Vec<Vec<usize>> {
        let mut slots: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (index, package) in self.packages.iter().enumerate() {
            let slot = *slots.entry(package.name.as_str()).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(index);
        }
        groups
    }

    fn process(
        &self,
        package: &'a PackageDescriptor,
        attempted: &mut HashSet<&'a str>,
    ) -> PackageResult {
        let outcome = self.install_one(package, attempted);
        match &outcome {
            InstallOutcome::Skipped(reason) => {
                tracing::debug!(package = %package.name, %reason, "skipped");
            }
            InstallOutcome::Installed { path, version } => {
                tracing::info!(
                    package = %package.name,
                    path = %path.display(),
                    version = %version,
                    "installed"
                );
            }
            InstallOutcome::Failed(err) => {
                tracing::warn!(
                    package = %package.name,
                    error = %err,
                    cause = %error_chain(err),
                    "install failed"
                );
            }
        }
        PackageResult {
            name: package.name.clone(),
            outcome,
        }
    }

    /// `attempted` holds the names that already reached the clone step in
    /// this run; each name gets at most one clone attempt.
    fn install_one(
        &self,
        package: &'a PackageDescriptor,
        attempted: &mut HashSet<&'a str>,
    ) -> InstallOutcome {
        if self.cache.is_installed(&package.name) {
            return InstallOutcome::Skipped(SkipReason::AlreadyInstalled);
        }
        let Some(url) = package.source_url() else {
            return InstallOutcome::Skipped(SkipReason::MissingSourceUrl);
        };
        let path = match package.install_path() {
            Ok(path) => path,
            Err(err) => return InstallOutcome::Failed(err),
        };
        if attempted.contains(package.name.as_str()) {
            return InstallOutcome::Skipped(SkipReason::DuplicateInBatch);
        }
        // Someone else got there between the query and now
        if !self.cache.reserve(&package.name) {
            return InstallOutcome::Skipped(SkipReason::AlreadyInstalled);
        }
        attempted.insert(package.name.as_str());

        let mut repo = match self.vcs.clone_repository(url, &path) {
            Ok(repo) => repo,
            Err(source) => {
                self.cache.release(&package.name);
                return InstallOutcome::Failed(InstallError::Clone {
                    url: url.to_string(),
                    path,
                    source,
                });
            }
        };

        let reference = package.checkout_ref();
        if let Err(source) = repo.checkout(reference) {
            self.cache.release(&package.name);
            return InstallOutcome::Failed(InstallError::Checkout {
                reference: reference.to_string(),
                path,
                source,
            });
        }

        let record = InstalledPackage::new(package.name.as_str(), reference, path.as_path(), url);
        if let Err(source) = self.cache.mark_installed(record) {
            self.cache.release(&package.name);
            return InstallOutcome::Failed(InstallError::Record {
                name: package.name.clone(),
                source,
            });
        }

        InstallOutcome::Installed {
            path,
            version: reference.to_string(),
        }
    }
}

/// Sources of `err`, outermost first, joined with `: `.
fn error_chain(err: &InstallError) -> String {
    let mut causes = Vec::new();
    let mut current = std::error::Error::source(err);
    while let Some(cause) = current {
        causes.push(cause.to_string());
        current = std::error::Error::source(cause);
    }
    causes.join(": ")
}

#[cfg(test)]
mod tests;
