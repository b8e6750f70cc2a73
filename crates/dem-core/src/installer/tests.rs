//! Tests for the installer module.

use super::*;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::cache::MemoryCache;
use crate::vcs::RepositoryHandle;

const URL: &str = "http://example.com/r1";

#[derive(Default)]
struct Calls {
    clones: Vec<(String, PathBuf)>,
    checkouts: Vec<(PathBuf, String)>,
}

/// Records every clone and checkout without touching the filesystem.
#[derive(Default)]
struct RecordingVcs {
    calls: Arc<Mutex<Calls>>,
    failing_urls: HashSet<String>,
    missing_refs: HashSet<String>,
}

impl RecordingVcs {
    fn failing_url(mut self, url: &str) -> Self {
        self.failing_urls.insert(url.to_string());
        self
    }

    fn missing_ref(mut self, reference: &str) -> Self {
        self.missing_refs.insert(reference.to_string());
        self
    }

    fn clones(&self) -> Vec<(String, PathBuf)> {
        self.calls.lock().unwrap().clones.clone()
    }

    fn checkouts(&self) -> Vec<(PathBuf, String)> {
        self.calls.lock().unwrap().checkouts.clone()
    }
}

struct RecordingRepo {
    path: PathBuf,
    calls: Arc<Mutex<Calls>>,
    missing_refs: HashSet<String>,
}

impl RepositoryHandle for RecordingRepo {
    fn checkout(&mut self, reference: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .checkouts
            .push((self.path.clone(), reference.to_string()));
        if self.missing_refs.contains(reference) {
            anyhow::bail!("Reference '{}' not found", reference);
        }
        Ok(())
    }
}

impl VersionControl for RecordingVcs {
    fn clone_repository(
        &self,
        url: &str,
        destination: &Path,
    ) -> anyhow::Result<Box<dyn RepositoryHandle>> {
        self.calls
            .lock()
            .unwrap()
            .clones
            .push((url.to_string(), destination.to_path_buf()));
        if self.failing_urls.contains(url) {
            anyhow::bail!("remote unreachable: {}", url);
        }
        Ok(Box::new(RecordingRepo {
            path: destination.to_path_buf(),
            calls: Arc::clone(&self.calls),
            missing_refs: self.missing_refs.clone(),
        }))
    }
}

/// Cache whose write-back always fails.
#[derive(Default)]
struct ReadOnlyCache {
    inner: MemoryCache,
}

impl PackageCache for ReadOnlyCache {
    fn is_installed(&self, name: &str) -> bool {
        self.inner.is_installed(name)
    }

    fn reserve(&self, name: &str) -> bool {
        self.inner.reserve(name)
    }

    fn release(&self, name: &str) {
        self.inner.release(name)
    }

    fn mark_installed(&self, _package: InstalledPackage) -> anyhow::Result<()> {
        anyhow::bail!("cache is read-only")
    }
}

fn pkg(name: &str, version: Option<&str>, destination: &str, url: Option<&str>) -> PackageDescriptor {
    let mut pkg = PackageDescriptor::new(name).with_destination(destination);
    if let Some(version) = version {
        pkg = pkg.with_version(version);
    }
    if let Some(url) = url {
        pkg = pkg.with_url(url);
    }
    pkg
}

fn two_packages() -> Vec<PackageDescriptor> {
    vec![
        pkg("package", Some("1.3.0"), "path", Some(URL)),
        pkg("package4", Some("0.3.0"), "path2", Some(URL)),
    ]
}

#[test]
fn does_not_clone_packages_already_installed() {
    let cache = MemoryCache::with_installed(["package", "package4"]);
    let vcs = RecordingVcs::default();
    let packages = two_packages();

    let report = ProjectInstaller::new(&packages, &cache, &vcs).install_packages();

    assert!(vcs.clones().is_empty());
    assert!(vcs.checkouts().is_empty());
    assert_eq!(report.skipped().count(), 2);
    assert_eq!(
        report.get("package").and_then(InstallOutcome::skip_reason),
        Some(SkipReason::AlreadyInstalled)
    );
}

#[test]
fn clones_and_checks_out_each_uncached_package() {
    let cache = MemoryCache::new();
    let vcs = RecordingVcs::default();
    let packages = two_packages();

    let report = ProjectInstaller::new(&packages, &cache, &vcs).install_packages();

    let path1 = Path::new("path").join("package");
    let path2 = Path::new("path2").join("package4");
    assert_eq!(
        vcs.clones(),
        vec![(URL.to_string(), path1.clone()), (URL.to_string(), path2.clone())]
    );
    assert_eq!(
        vcs.checkouts(),
        vec![(path1, "1.3.0".to_string()), (path2, "0.3.0".to_string())]
    );
    assert!(report.is_success());
    assert_eq!(report.installed().count(), 2);
}

#[test]
fn checks_out_master_when_version_missing() {
    let cache = MemoryCache::new();
    let vcs = RecordingVcs::default();
    let packages = vec![pkg("package", None, "path", Some(URL))];

    let report = ProjectInstaller::new(&packages, &cache, &vcs).install_packages();

    assert_eq!(
        vcs.clones(),
        vec![(URL.to_string(), Path::new("path").join("package"))]
    );
    assert_eq!(vcs.checkouts()[0].1, "master");
    match report.get("package") {
        Some(InstallOutcome::Installed { version, .. }) => assert_eq!(version, "master"),
        other => panic!("expected install, got {other:?}"),
    }
}

#[test]
fn missing_url_skips_only_that_package() {
    let cache = MemoryCache::new();
    let vcs = RecordingVcs::default();
    let packages = vec![
        pkg("package", Some("1.3.0"), "path", None),
        pkg("package4", Some("0.3.0"), "path2", Some(URL)),
    ];

    let report = ProjectInstaller::new(&packages, &cache, &vcs).install_packages();

    let path2 = Path::new("path2").join("package4");
    assert_eq!(vcs.clones(), vec![(URL.to_string(), path2.clone())]);
    assert_eq!(vcs.checkouts(), vec![(path2, "0.3.0".to_string())]);
    assert_eq!(
        report.get("package").and_then(InstallOutcome::skip_reason),
        Some(SkipReason::MissingSourceUrl)
    );
    assert!(report.get("package4").unwrap().is_installed());
    assert!(report.is_success());
}

#[test]
fn empty_url_is_skipped_like_a_missing_one() {
    let cache = MemoryCache::new();
    let vcs = RecordingVcs::default();
    let packages = vec![pkg("package", None, "path", Some(""))];

    let report = ProjectInstaller::new(&packages, &cache, &vcs).install_packages();

    assert!(vcs.clones().is_empty());
    assert_eq!(
        report.results[0].outcome.skip_reason(),
        Some(SkipReason::MissingSourceUrl)
    );
}

#[test]
fn cached_and_uncached_mix_in_either_order() {
    for cached_first in [true, false] {
        let cache = MemoryCache::with_installed(["cached"]);
        let vcs = RecordingVcs::default();
        let mut packages = vec![
            pkg("cached", None, "deps", Some(URL)),
            pkg("fresh", None, "deps", Some(URL)),
        ];
        if !cached_first {
            packages.reverse();
        }

        ProjectInstaller::new(&packages, &cache, &vcs).install_packages();

        assert_eq!(
            vcs.clones(),
            vec![(URL.to_string(), Path::new("deps").join("fresh"))]
        );
    }
}

#[test]
fn successful_install_is_recorded_in_cache() {
    let cache = MemoryCache::new();
    let vcs = RecordingVcs::default();
    let packages = two_packages();

    ProjectInstaller::new(&packages, &cache, &vcs).install_packages();

    let record = cache.get("package").unwrap();
    assert_eq!(record.version, "1.3.0");
    assert_eq!(record.path, Path::new("path").join("package"));
    assert_eq!(record.source_url, URL);

    // A second run finds everything cached
    let second = RecordingVcs::default();
    let report = ProjectInstaller::new(&packages, &cache, &second).install_packages();
    assert!(second.clones().is_empty());
    assert_eq!(report.skipped().count(), 2);
}

#[test]
fn clone_failure_is_reported_and_batch_continues() {
    let bad = "http://example.com/missing";
    let cache = MemoryCache::new();
    let vcs = RecordingVcs::default().failing_url(bad);
    let packages = vec![
        pkg("broken", None, "deps", Some(bad)),
        pkg("fine", None, "deps", Some(URL)),
    ];

    let report = ProjectInstaller::new(&packages, &cache, &vcs).install_packages();

    assert!(!report.is_success());
    assert!(matches!(
        report.get("broken").and_then(InstallOutcome::error),
        Some(InstallError::Clone { .. })
    ));
    assert!(report.get("fine").unwrap().is_installed());
    // No checkout happens without a clone
    assert_eq!(vcs.checkouts().len(), 1);
    // Failed package stays uncached and can be retried
    assert!(!cache.is_installed("broken"));
    assert!(cache.reserve("broken"));
}

#[test]
fn checkout_failure_is_distinct_from_clone_failure() {
    let cache = MemoryCache::new();
    let vcs = RecordingVcs::default().missing_ref("9.9.9");
    let packages = vec![pkg("package", Some("9.9.9"), "path", Some(URL))];

    let report = ProjectInstaller::new(&packages, &cache, &vcs).install_packages();

    let err = report.get("package").and_then(InstallOutcome::error).unwrap();
    assert!(matches!(err, InstallError::Checkout { reference, .. } if reference == "9.9.9"));
    assert_eq!(err.leftover_path(), Some(Path::new("path").join("package").as_path()));
    assert!(!cache.is_installed("package"));
}

#[test]
fn missing_destination_fails_without_cloning() {
    let cache = MemoryCache::new();
    let vcs = RecordingVcs::default();
    let packages = vec![
        PackageDescriptor::new("nowhere").with_url(URL),
        pkg("package", None, "path", Some(URL)),
    ];

    let report = ProjectInstaller::new(&packages, &cache, &vcs).install_packages();

    assert!(matches!(
        report.get("nowhere").and_then(InstallOutcome::error),
        Some(InstallError::InvalidDestination { .. })
    ));
    assert_eq!(vcs.clones().len(), 1);
    assert!(cache.reserve("nowhere"));
}

#[test]
fn record_failure_is_reported() {
    let cache = ReadOnlyCache::default();
    let vcs = RecordingVcs::default();
    let packages = vec![pkg("package", None, "path", Some(URL))];

    let report = ProjectInstaller::new(&packages, &cache, &vcs).install_packages();

    assert!(matches!(
        report.get("package").and_then(InstallOutcome::error),
        Some(InstallError::Record { .. })
    ));
    assert!(cache.reserve("package"));
}

#[test]
fn duplicate_names_are_cloned_once() {
    let cache = MemoryCache::new();
    let vcs = RecordingVcs::default();
    let packages = vec![
        pkg("package", Some("1.0.0"), "a", Some(URL)),
        pkg("package", Some("2.0.0"), "b", Some(URL)),
    ];

    let report = ProjectInstaller::new(&packages, &cache, &vcs).install_packages();

    assert_eq!(vcs.clones().len(), 1);
    assert!(report.results[0].outcome.is_installed());
    assert_eq!(
        report.results[1].outcome.skip_reason(),
        Some(SkipReason::AlreadyInstalled)
    );
}

#[test]
fn duplicate_of_failed_package_is_not_retried_in_same_run() {
    let bad = "http://example.com/missing";
    let cache = MemoryCache::new();
    let vcs = RecordingVcs::default().failing_url(bad);
    let packages = vec![
        pkg("package", None, "a", Some(bad)),
        pkg("package", None, "b", Some(URL)),
    ];

    let report = ProjectInstaller::new(&packages, &cache, &vcs).install_packages();

    assert_eq!(vcs.clones().len(), 1);
    assert!(report.results[0].outcome.is_failed());
    assert_eq!(
        report.results[1].outcome.skip_reason(),
        Some(SkipReason::DuplicateInBatch)
    );
}

#[test]
fn duplicate_after_url_less_entry_is_installed() {
    let cache = MemoryCache::new();
    let vcs = RecordingVcs::default();
    let packages = vec![
        pkg("package", None, "deps", None),
        pkg("package", Some("1.3.0"), "deps", Some(URL)),
    ];

    let report = ProjectInstaller::new(&packages, &cache, &vcs).install_packages();

    assert_eq!(
        report.results[0].outcome.skip_reason(),
        Some(SkipReason::MissingSourceUrl)
    );
    assert!(report.results[1].outcome.is_installed());
    assert_eq!(vcs.clones(), vec![(URL.to_string(), Path::new("deps").join("package"))]);
    assert!(cache.is_installed("package"));
}

#[test]
fn duplicate_after_invalid_destination_is_installed() {
    let cache = MemoryCache::new();
    let vcs = RecordingVcs::default();
    let packages = vec![
        PackageDescriptor::new("package").with_url(URL),
        pkg("package", None, "deps", Some(URL)),
    ];

    let report = ProjectInstaller::new(&packages, &cache, &vcs).install_packages();

    assert!(matches!(
        report.results[0].outcome.error(),
        Some(InstallError::InvalidDestination { .. })
    ));
    assert!(report.results[1].outcome.is_installed());
    assert_eq!(vcs.clones().len(), 1);
}

#[test]
fn every_entry_of_a_cached_name_reports_already_installed() {
    let cache = MemoryCache::with_installed(["package"]);
    let vcs = RecordingVcs::default();
    let packages = vec![
        pkg("package", None, "a", Some(URL)),
        pkg("package", None, "b", Some(URL)),
    ];

    for jobs in [1, 4] {
        let report = ProjectInstaller::new(&packages, &cache, &vcs)
            .with_jobs(jobs)
            .install_packages();
        for result in &report.results {
            assert_eq!(
                result.outcome.skip_reason(),
                Some(SkipReason::AlreadyInstalled)
            );
        }
    }
    assert!(vcs.clones().is_empty());
}

#[test]
fn parallel_duplicates_match_sequential_outcomes() {
    let bad = "http://example.com/missing";
    let packages = vec![
        pkg("a", None, "deps", None),
        pkg("b", None, "deps", Some(bad)),
        pkg("a", None, "deps", Some(URL)),
        pkg("b", None, "deps", Some(URL)),
        pkg("c", None, "deps", Some(URL)),
        pkg("c", None, "other", Some(URL)),
    ];

    let outcomes = |jobs: usize| {
        let cache = MemoryCache::new();
        let vcs = RecordingVcs::default().failing_url(bad);
        let report = ProjectInstaller::new(&packages, &cache, &vcs)
            .with_jobs(jobs)
            .install_packages();
        let summary: Vec<_> = report
            .results
            .iter()
            .map(|r| (r.outcome.is_installed(), r.outcome.is_failed(), r.outcome.skip_reason()))
            .collect();
        (summary, vcs.clones().len())
    };

    let (sequential, sequential_clones) = outcomes(1);
    let (parallel, parallel_clones) = outcomes(3);
    assert_eq!(sequential, parallel);
    assert_eq!(sequential_clones, 3);
    assert_eq!(parallel_clones, 3);
    assert_eq!(sequential[3].2, Some(SkipReason::DuplicateInBatch));
    assert_eq!(sequential[5].2, Some(SkipReason::AlreadyInstalled));
}

#[test]
fn parallel_run_keeps_input_order_and_clones_each_once() {
    let cache = MemoryCache::with_installed(["p3"]);
    let vcs = RecordingVcs::default();
    let mut packages: Vec<_> = (0..12)
        .map(|i| pkg(&format!("p{i}"), None, "deps", Some(URL)))
        .collect();
    packages.push(pkg("p0", None, "other", Some(URL)));
    packages.push(pkg("nourl", None, "deps", None));

    let report = ProjectInstaller::new(&packages, &cache, &vcs)
        .with_jobs(4)
        .install_packages();

    let names: Vec<_> = report.results.iter().map(|r| r.name.as_str()).collect();
    let expected: Vec<_> = packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, expected);

    let mut cloned: Vec<_> = vcs.clones().into_iter().map(|(_, path)| path).collect();
    cloned.sort();
    let mut wanted: Vec<_> = (0..12)
        .filter(|i| *i != 3)
        .map(|i| Path::new("deps").join(format!("p{i}")))
        .collect();
    wanted.sort();
    assert_eq!(cloned, wanted);

    assert_eq!(report.installed().count(), 11);
    assert_eq!(
        report.results[12].outcome.skip_reason(),
        Some(SkipReason::AlreadyInstalled)
    );
    assert_eq!(
        report.results[13].outcome.skip_reason(),
        Some(SkipReason::MissingSourceUrl)
    );
}

#[test]
fn zero_jobs_runs_sequentially() {
    let cache = MemoryCache::new();
    let vcs = RecordingVcs::default();
    let packages = two_packages();

    let report = ProjectInstaller::new(&packages, &cache, &vcs)
        .with_jobs(0)
        .install_packages();

    assert_eq!(report.installed().count(), 2);
}

#[test]
fn worker_count_comes_from_config() {
    let cache = MemoryCache::new();
    let vcs = RecordingVcs::default();
    let packages = two_packages();
    let config = DemConfig {
        jobs: 6,
        ..Default::default()
    };

    let installer = ProjectInstaller::new(&packages, &cache, &vcs).with_config(&config);
    assert_eq!(installer.jobs(), 6);
    assert_eq!(installer.install_packages().installed().count(), 2);

    let defaults = ProjectInstaller::new(&packages, &cache, &vcs)
        .with_config(&DemConfig::default());
    assert_eq!(defaults.jobs(), 1);
}

#[test]
fn empty_batch_is_an_empty_report() {
    let cache = MemoryCache::new();
    let vcs = RecordingVcs::default();

    let report = ProjectInstaller::new(&[], &cache, &vcs)
        .with_jobs(8)
        .install_packages();

    assert!(report.is_empty());
    assert!(report.is_success());
}

#[test]
fn error_chain_includes_vcs_cause() {
    let bad = "http://example.com/missing";
    let cache = MemoryCache::new();
    let vcs = RecordingVcs::default().failing_url(bad);
    let packages = vec![pkg("broken", None, "deps", Some(bad))];

    let report = ProjectInstaller::new(&packages, &cache, &vcs).install_packages();

    let err = report.get("broken").and_then(InstallOutcome::error).unwrap();
    assert!(err.to_string().starts_with("failed to clone"));
    assert!(error_chain(err).contains("remote unreachable"));
}
