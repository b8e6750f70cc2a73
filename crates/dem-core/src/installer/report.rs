//! Per-package outcomes of an install run.

use std::fmt;
use std::path::PathBuf;

use super::InstallError;

/// Why a package was not fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The cache already has it.
    AlreadyInstalled,
    /// The descriptor has no remote to clone from.
    MissingSourceUrl,
    /// An earlier descriptor in the same run has the same name.
    DuplicateInBatch,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AlreadyInstalled => "already installed",
            Self::MissingSourceUrl => "no source url",
            Self::DuplicateInBatch => "duplicate in batch",
        };
        f.write_str(text)
    }
}

/// Terminal state of one descriptor.
#[derive(Debug)]
pub enum InstallOutcome {
    Skipped(SkipReason),
    Installed { path: PathBuf, version: String },
    Failed(InstallError),
}

impl InstallOutcome {
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&InstallError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct PackageResult {
    pub name: String,
    pub outcome: InstallOutcome,
}

/// Results in the same order as the input descriptors.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub results: Vec<PackageResult>,
}

impl InstallReport {
    pub fn installed(&self) -> impl Iterator<Item = &PackageResult> {
        self.results.iter().filter(|r| r.outcome.is_installed())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &PackageResult> {
        self.results
            .iter()
            .filter(|r| r.outcome.skip_reason().is_some())
    }

    pub fn failed(&self) -> impl Iterator<Item = &PackageResult> {
        self.results.iter().filter(|r| r.outcome.is_failed())
    }

    /// True when no package failed.
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn get(&self, name: &str) -> Option<&InstallOutcome> {
        self.results
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.outcome)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
