//! Installing the tool itself into a fresh environment.

use std::process::Command;

use anyhow::Context;

use super::Environment;
use crate::config::DemConfig;

/// Package installed into every new environment.
pub const TOOL_PACKAGE: &str = "dem";

/// Sets up the isolated runtime inside an environment root.
pub trait RuntimeProvisioner {
    fn provision(&self, env: &Environment, config: &DemConfig) -> anyhow::Result<()>;
}

/// Creates a Python virtualenv and pip-installs the tool into it.
#[derive(Debug, Clone)]
pub struct PythonVenvProvisioner {
    python: String,
    package: String,
}

impl Default for PythonVenvProvisioner {
    fn default() -> Self {
        Self {
            python: if cfg!(windows) { "python" } else { "python3" }.to_string(),
            package: TOOL_PACKAGE.to_string(),
        }
    }
}

impl PythonVenvProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }
}

impl RuntimeProvisioner for PythonVenvProvisioner {
    fn provision(&self, env: &Environment, config: &DemConfig) -> anyhow::Result<()> {
        let mut venv = Command::new(&self.python);
        venv.arg("-m").arg("venv").arg(env.root());
        run(venv, "create virtualenv")?;

        let pip = pip_install_command(env, config, &self.package);
        run(pip, "install tool into environment")
    }
}

/// `<bin>/pip [--proxy <proxy>] install <package>` for `env`.
pub fn pip_install_command(env: &Environment, config: &DemConfig, package: &str) -> Command {
    let mut cmd = Command::new(env.pip_path());
    if config.has_http_proxy() {
        cmd.arg("--proxy").arg(config.http_proxy());
    }
    cmd.arg("install").arg(package);
    cmd
}

fn run(mut cmd: Command, what: &str) -> anyhow::Result<()> {
    tracing::debug!(command = ?cmd, "running");
    let output = cmd
        .output()
        .with_context(|| format!("Failed to {}: could not run {:?}", what, cmd.get_program()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Failed to {}: {}", what, stderr.trim());
    }
    Ok(())
}
