//! Package descriptors consumed by the installer.
//!
//! Descriptors arrive already parsed; this module only models them and
//! derives the install location from them.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::installer::InstallError;

/// Reference checked out when a descriptor has no version.
pub const DEFAULT_BRANCH: &str = "master";

/// One already-resolved package to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Package identifier, also the cache key and the install directory name
    pub name: String,

    /// Version reference to check out (tag, branch or commit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Remote to clone from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Directory the package is cloned into, as `<destination>/<name>`
    #[serde(
        default,
        rename = "platform-destination-path",
        alias = "destination",
        skip_serializing_if = "Option::is_none"
    )]
    pub destination: Option<PathBuf>,
}

impl PackageDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            url: None,
            destination: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// The remote to clone from, or `None` when it is absent or blank.
    pub fn source_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// The reference to check out after cloning.
    pub fn checkout_ref(&self) -> &str {
        self.version
            .as_deref()
            .filter(|version| !version.trim().is_empty())
            .unwrap_or(DEFAULT_BRANCH)
    }

    /// Compute `<destination>/<name>` with the host's path rules.
    ///
    /// The name must be a single normal path component so the result never
    /// escapes the destination root.
    pub fn install_path(&self) -> Result<PathBuf, InstallError> {
        let destination = self
            .destination
            .as_deref()
            .filter(|dest| !dest.as_os_str().is_empty())
            .ok_or_else(|| InstallError::InvalidDestination {
                name: self.name.clone(),
                reason: "no destination path".to_string(),
            })?;

        if !is_single_component(&self.name) {
            return Err(InstallError::InvalidDestination {
                name: self.name.clone(),
                reason: "package name is not a plain directory name".to_string(),
            });
        }

        Ok(destination.join(&self.name))
    }
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
