//! Managed directory layout under the data root.

use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};

use crate::item::Kind;
use crate::runtime::Runtime;

const REGISTRY_FILE: &str = "registry.json";
const INCLUDED_DIR: &str = "included";
const LOG_HELPER: &str = "log.sh";
const CORE_HELPER: &str = "core.sh";

/// Environment variable overriding the data root.
pub const ROOT_ENV: &str = "PLUGKIT_ROOT";

/// Paths of everything plugkit manages.
///
/// ```text
/// <root>/
///   binaries/<name>      single file
///   libraries/<name>/    directory tree
///   modules/<name>       single file
///   packages/<name>/     directory tree
///   included/            helper scripts sourced by script modules
///   registry.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind_dir(&self, kind: Kind) -> PathBuf {
        self.root.join(kind.plural())
    }

    /// Where the payload of `(kind, name)` lives once installed.
    pub fn install_path(&self, kind: Kind, name: &str) -> PathBuf {
        self.kind_dir(kind).join(name)
    }

    pub fn included_dir(&self) -> PathBuf {
        self.root.join(INCLUDED_DIR)
    }

    /// Logging helper sourced by script modules.
    pub fn log_helper(&self) -> PathBuf {
        self.included_dir().join(LOG_HELPER)
    }

    pub fn core_helper(&self) -> PathBuf {
        self.included_dir().join(CORE_HELPER)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    /// Every directory created at bootstrap and wiped by purge.
    pub fn managed_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Kind::ALL.iter().map(|k| self.kind_dir(*k)).collect();
        dirs.push(self.included_dir());
        dirs
    }
}

/// Resolve the data root: explicit path, then `PLUGKIT_ROOT`, then the default.
#[tracing::instrument(skip(runtime))]
pub fn resolve_data_root<R: Runtime>(runtime: &R, explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Ok(path) = runtime.env_var(ROOT_ENV)
        && !path.is_empty()
    {
        return Ok(PathBuf::from(path));
    }
    let root = default_data_root(runtime)?;
    info!("Using data root: {}", root.display());
    Ok(root)
}

/// Get the default data root directory
#[tracing::instrument(skip(runtime))]
pub fn default_data_root<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if runtime.is_privileged() {
        Ok(system_data_root())
    } else {
        let home_dir = runtime
            .home_dir()
            .context("Could not find home directory")?;
        Ok(home_dir.join(".plugkit"))
    }
}

#[cfg(target_os = "macos")]
fn system_data_root() -> PathBuf {
    PathBuf::from("/opt/plugkit")
}

#[cfg(target_os = "windows")]
fn system_data_root() -> PathBuf {
    PathBuf::from(r"C:\ProgramData\plugkit")
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn system_data_root() -> PathBuf {
    PathBuf::from("/usr/local/plugkit")
}
