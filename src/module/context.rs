use log::debug;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::item::Kind;
use crate::layout::DataLayout;
use crate::project::ProjectProperties;
use crate::registry::ItemRegistry;
use crate::runtime::Runtime;

/// Path of the logging helper script sourced by script modules.
pub const LOG_HELPER_ENV: &str = "PLUGKIT_LOG";
/// Path of the core helper script sourced by script modules.
pub const CORE_HELPER_ENV: &str = "PLUGKIT_CORE";
/// Device/session identifier of the current project.
pub const DEVICE_ID_ENV: &str = "PLUGKIT_DEVICE_ID";
/// Data root, so script modules can call back into plugkit.
pub const DATA_ROOT_ENV: &str = crate::layout::ROOT_ENV;

/// Everything a module invocation may depend on, passed explicitly instead of
/// read from process-wide state.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub data: DataLayout,
    pub project: Option<ProjectProperties>,
    /// Directories searched for shared libraries before loading a native module.
    pub library_paths: Vec<PathBuf>,
}

impl LaunchContext {
    pub fn new(data: DataLayout, project: Option<ProjectProperties>) -> Self {
        Self {
            data,
            project,
            library_paths: Vec::new(),
        }
    }

    /// Add the install directory of every registered library to the search path.
    ///
    /// An uninitialized registry (first run) contributes nothing.
    pub fn with_library_paths<R: Runtime>(mut self, registry: &ItemRegistry<'_, R>) -> Self {
        if !registry.is_initialized() {
            debug!("Registry not initialized, skipping library paths");
            return self;
        }
        for library in registry.list(Kind::Library) {
            let path = self.data.install_path(Kind::Library, &library.name);
            if !self.library_paths.contains(&path) {
                self.library_paths.push(path);
            }
        }
        self
    }

    pub fn project_root(&self) -> Option<&Path> {
        self.project.as_ref().map(|p| p.root())
    }

    pub fn device_id(&self) -> Option<&str> {
        self.project.as_ref().and_then(|p| p.device_id())
    }

    /// Variables layered over the parent environment for script modules.
    pub fn script_environment(&self) -> Vec<(&'static str, OsString)> {
        let mut env = vec![
            (LOG_HELPER_ENV, self.data.log_helper().into_os_string()),
            (CORE_HELPER_ENV, self.data.core_helper().into_os_string()),
            (DATA_ROOT_ENV, self.data.root().as_os_str().to_os_string()),
        ];
        match self.device_id() {
            Some(id) => env.push((DEVICE_ID_ENV, OsString::from(id))),
            None => debug!("No device id configured for this project"),
        }
        env
    }
}
