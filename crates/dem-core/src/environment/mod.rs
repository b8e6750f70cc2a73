//! Project environment bootstrap.
//!
//! An environment is a directory `<base>/.devenv/<project>` holding an
//! isolated runtime plus `dependencies/` and `downloads/`. Building it is a
//! one-time step: if the root already exists nothing happens.

mod provisioner;

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::DemConfig;

pub use provisioner::{PythonVenvProvisioner, RuntimeProvisioner, TOOL_PACKAGE, pip_install_command};

pub const DEVENV_DIR: &str = ".devenv";

/// Layout of a project environment on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    root: PathBuf,
}

impl Environment {
    /// Environment for `project` under `base` (normally the current directory).
    pub fn for_project(base: &Path, project: &str) -> Self {
        Self {
            root: base.join(DEVENV_DIR).join(project),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where packages are cloned.
    pub fn dependencies_dir(&self) -> PathBuf {
        self.root.join("dependencies")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn bin_dir(&self) -> PathBuf {
        if cfg!(windows) {
            self.root.join("Scripts")
        } else {
            self.root.join("bin")
        }
    }

    pub fn pip_path(&self) -> PathBuf {
        if cfg!(windows) {
            self.bin_dir().join("pip.exe")
        } else {
            self.bin_dir().join("pip")
        }
    }

    pub fn exists(&self) -> bool {
        self.root.exists()
    }
}

/// What [`EnvironmentBuilder::build`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Created(Environment),
    AlreadyExists(Environment),
}

impl BuildOutcome {
    pub fn environment(&self) -> &Environment {
        match self {
            Self::Created(env) | Self::AlreadyExists(env) => env,
        }
    }
}

pub struct EnvironmentBuilder;

impl EnvironmentBuilder {
    /// Create the environment for `project` unless it already exists.
    ///
    /// On failure the partly built root is removed, so the next call starts
    /// over instead of reporting [`BuildOutcome::AlreadyExists`].
    pub fn build(
        base: &Path,
        project: &str,
        config: &DemConfig,
        provisioner: &dyn RuntimeProvisioner,
    ) -> anyhow::Result<BuildOutcome> {
        let env = Environment::for_project(base, project);
        if env.exists() {
            tracing::debug!(root = %env.root().display(), "environment already exists");
            return Ok(BuildOutcome::AlreadyExists(env));
        }

        tracing::info!(project, root = %env.root().display(), "building environment");
        std::fs::create_dir_all(env.root()).with_context(|| {
            format!("Failed to create environment: {}", env.root().display())
        })?;

        if let Err(err) = Self::populate(&env, project, config, provisioner) {
            if let Err(cleanup) = std::fs::remove_dir_all(env.root()) {
                tracing::warn!(
                    root = %env.root().display(),
                    error = %cleanup,
                    "failed to remove partial environment"
                );
            }
            return Err(err);
        }

        Ok(BuildOutcome::Created(env))
    }

    fn populate(
        env: &Environment,
        project: &str,
        config: &DemConfig,
        provisioner: &dyn RuntimeProvisioner,
    ) -> anyhow::Result<()> {
        provisioner
            .provision(env, config)
            .with_context(|| format!("Failed to provision environment for '{}'", project))?;

        for dir in [env.dependencies_dir(), env.downloads_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}
